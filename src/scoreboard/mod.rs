pub mod espn;
pub mod models;
pub mod provider;

pub use espn::EspnClient;
pub use models::{
    GameSituation, GameSnapshot, GameStatus, LastPlay, RedZoneInfo, Scoreboard, Sport, TeamScore,
};
pub use provider::ScoreboardSource;
