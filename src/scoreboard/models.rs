use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sports the monitor knows how to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    #[value(name = "nfl")]
    Nfl,
    #[value(
        name = "college_football",
        alias = "cfb",
        alias = "college-football",
        alias = "ncaaf"
    )]
    CollegeFootball,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Nfl => "nfl",
            Sport::CollegeFootball => "college_football",
        }
    }

    pub fn parse(s: &str) -> Option<Sport> {
        match s.to_lowercase().as_str() {
            "nfl" => Some(Sport::Nfl),
            "college_football" | "college-football" | "cfb" | "ncaaf" => Some(Sport::CollegeFootball),
            _ => None,
        }
    }

    /// League path segment used by the ESPN scoreboard API.
    pub fn espn_league(&self) -> &'static str {
        match self {
            Sport::Nfl => "nfl",
            Sport::CollegeFootball => "college-football",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a game: team identity plus its current score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScore {
    pub team_id: String,
    pub abbreviation: String,
    pub display_name: String,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Pregame,
    InProgress,
    Final,
    Unknown,
}

impl GameStatus {
    /// Map the upstream status vocabulary onto the four canonical states.
    /// Unrecognised or missing values become `Unknown`.
    pub fn from_upstream(state: Option<&str>) -> GameStatus {
        let state = match state {
            Some(s) if !s.is_empty() => s.to_lowercase(),
            _ => return GameStatus::Unknown,
        };
        match state.as_str() {
            "pre" | "pre-game" | "scheduled" => GameStatus::Pregame,
            "in" | "in-progress" | "inprogress" => GameStatus::InProgress,
            "post" | "postgame" | "final" => GameStatus::Final,
            _ => GameStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedZoneInfo {
    pub active: bool,
    /// Abbreviation of the team with the ball, when it could be resolved
    /// against the game's own home/away teams.
    pub team_abbr: Option<String>,
    pub yard_line: Option<u32>,
}

/// Live down-and-distance context. Only present while a game is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSituation {
    pub possession_team_id: Option<String>,
    pub down_distance: Option<String>,
    pub field_position: Option<String>,
    pub is_red_zone: bool,
    pub clock: Option<String>,
    pub period: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPlay {
    /// Upstream play id, used to process each play at most once.
    pub id: String,
    /// Upstream play-type code, authoritative when present.
    pub type_code: Option<u32>,
    pub description: String,
    /// Team the play is attributed to (the offense for most plays).
    pub team_id: Option<String>,
    pub score_value: Option<u32>,
}

/// Complete picture of one game at one poll. Never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: String,
    pub sport: Sport,
    pub home: TeamScore,
    pub away: TeamScore,
    pub status: GameStatus,
    pub last_update: DateTime<Utc>,
    pub red_zone: RedZoneInfo,
    pub situation: Option<GameSituation>,
    pub last_play: Option<LastPlay>,
}

impl GameSnapshot {
    pub fn teams(&self) -> [&TeamScore; 2] {
        [&self.home, &self.away]
    }

    /// The other team in this game.
    pub fn opponent_of(&self, team_id: &str) -> Option<&TeamScore> {
        if self.home.team_id == team_id {
            Some(&self.away)
        } else if self.away.team_id == team_id {
            Some(&self.home)
        } else {
            None
        }
    }

    pub fn involves_any(&self, abbreviations: &[String]) -> bool {
        abbreviations
            .iter()
            .any(|a| *a == self.home.abbreviation || *a == self.away.abbreviation)
    }

    /// Team with the strictly higher score, if any.
    pub fn winner(&self) -> Option<&TeamScore> {
        if self.home.score > self.away.score {
            Some(&self.home)
        } else if self.away.score > self.home.score {
            Some(&self.away)
        } else {
            None
        }
    }

    pub fn score_line(&self) -> String {
        format!(
            "{} {} - {} {}",
            self.home.abbreviation, self.home.score, self.away.abbreviation, self.away.score
        )
    }
}

/// Result of one scoreboard fetch for one sport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scoreboard {
    pub sport: Sport,
    pub games: Vec<GameSnapshot>,
    pub fetched_at: DateTime<Utc>,
}
