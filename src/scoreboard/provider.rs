use anyhow::Result;
use async_trait::async_trait;

use super::models::{Scoreboard, Sport};

/// Trait that every scoreboard feed must implement.
#[async_trait]
pub trait ScoreboardSource: Send + Sync {
    /// Fetch a fresh, complete scoreboard for one sport.
    async fn fetch_scoreboard(&self, sport: Sport) -> Result<Scoreboard>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
