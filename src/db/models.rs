use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoreboard::Sport;

/// A game someone has opted in to celebrations for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredGame {
    pub game_id: String,
    pub sport: Sport,
    pub home_team_abbr: String,
    pub away_team_abbr: String,
    /// One or both team abbreviations, e.g. ["BUF"] or ["BUF", "NE"]
    pub monitored_teams: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for adding or updating monitoring of a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringRequest {
    pub game_id: String,
    pub sport: Sport,
    pub home_team_abbr: String,
    pub away_team_abbr: String,
    pub monitored_teams: Vec<String>,
}

/// A row of the celebration history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CelebrationRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub sport: String,
    pub team: String,
    pub event_type: String,
    pub game_id: String,
    pub detail: Option<String>,
}
