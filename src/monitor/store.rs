use anyhow::Result;
use async_trait::async_trait;

/// Opt-in lookup the monitor consults before emitting anything.
///
/// The monitor never edits watch selections itself, apart from dropping a
/// game once it has gone final.
#[async_trait]
pub trait MonitoringStore: Send + Sync {
    /// Whether `team_abbr` has been opted in for `game_id`.
    async fn is_team_monitored(&self, game_id: &str, team_abbr: &str) -> Result<bool>;

    /// Stop monitoring `game_id`. Idempotent; returns whether a row existed.
    async fn remove_monitoring(&self, game_id: &str) -> Result<bool>;
}
