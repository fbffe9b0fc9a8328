use clap::Parser;
use std::time::Duration;

use crate::monitor::MonitorConfig;
use crate::scoreboard::Sport;

/// Live football scoreboard monitor with celebration events
#[derive(Parser, Debug, Clone)]
#[command(name = "stadium-watch", version, about)]
pub struct Config {
    /// SQLite database path (monitoring preferences and celebration history)
    #[arg(long, env = "STADIUM_DB_PATH", default_value = "stadium.db")]
    pub database_path: String,

    /// API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: String,

    /// Sports to monitor (comma-separated)
    #[arg(
        long,
        env = "SPORTS",
        value_enum,
        value_delimiter = ',',
        default_value = "nfl,college_football"
    )]
    pub sports: Vec<Sport>,

    /// NFL scoreboard polling interval in seconds
    #[arg(long, env = "NFL_POLL_SECS", default_value = "7")]
    pub nfl_poll_secs: u64,

    /// College football scoreboard polling interval in seconds
    #[arg(long, env = "CFB_POLL_SECS", default_value = "7")]
    pub cfb_poll_secs: u64,

    /// Only process NFL games involving these teams (comma-separated, empty = all)
    #[arg(long, env = "NFL_FAVORITES", value_delimiter = ',')]
    pub nfl_favorites: Vec<String>,

    /// Only process college games involving these teams (comma-separated, empty = all)
    #[arg(long, env = "CFB_FAVORITES", value_delimiter = ',')]
    pub cfb_favorites: Vec<String>,

    /// ESPN football scoreboard API base URL
    #[arg(
        long,
        env = "ESPN_BASE_URL",
        default_value = "https://site.api.espn.com/apis/site/v2/sports/football"
    )]
    pub espn_base_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sports.is_empty() {
            anyhow::bail!("at least one sport must be enabled");
        }
        if self.nfl_poll_secs == 0 || self.cfb_poll_secs == 0 {
            anyhow::bail!("poll intervals must be at least one second");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be positive");
        }
        if self.espn_base_url.trim().is_empty() {
            anyhow::bail!("espn_base_url must not be empty");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// One monitor config per enabled sport, duplicates collapsed.
    pub fn monitor_configs(&self) -> Vec<MonitorConfig> {
        let mut sports = self.sports.clone();
        sports.sort_by_key(|s| s.as_str());
        sports.dedup();

        sports
            .into_iter()
            .map(|sport| {
                let (secs, favorites) = match sport {
                    Sport::Nfl => (self.nfl_poll_secs, &self.nfl_favorites),
                    Sport::CollegeFootball => (self.cfb_poll_secs, &self.cfb_favorites),
                };
                MonitorConfig {
                    sport,
                    poll_interval: Duration::from_secs(secs),
                    favorite_teams: normalise_teams(favorites),
                }
            })
            .collect()
    }
}

fn normalise_teams(teams: &[String]) -> Vec<String> {
    teams
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}
