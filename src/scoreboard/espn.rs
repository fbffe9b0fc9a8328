use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::models::{
    GameSituation, GameSnapshot, GameStatus, LastPlay, RedZoneInfo, Scoreboard, Sport, TeamScore,
};
use super::provider::ScoreboardSource;

pub const DEFAULT_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports/football";

/// Why a single scoreboard event could not be turned into a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("event has no id")]
    MissingId,
    #[error("event has no competition")]
    MissingCompetition,
    #[error("no competitor tagged '{0}'")]
    MissingCompetitor(&'static str),
    #[error("invalid score '{0}'")]
    InvalidScore(String),
}

/// Scoreboard client for ESPN's public site API. No API key required.
#[derive(Clone)]
pub struct EspnClient {
    http: Client,
    /// Base URL for overriding in tests
    base_url: String,
}

impl EspnClient {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(EspnClient {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn scoreboard_url(&self, sport: Sport) -> String {
        format!("{}/{}/scoreboard", self.base_url, sport.espn_league())
    }
}

#[async_trait]
impl ScoreboardSource for EspnClient {
    fn name(&self) -> &str {
        "ESPN"
    }

    async fn fetch_scoreboard(&self, sport: Sport) -> Result<Scoreboard> {
        let url = self.scoreboard_url(sport);
        debug!(sport = %sport, url = %url, "Fetching ESPN scoreboard");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("ESPN scoreboard request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("ESPN scoreboard error: {}", resp.status());
        }

        let raw: Value = resp
            .json()
            .await
            .context("Failed to parse ESPN scoreboard response")?;

        Ok(parse_scoreboard(&raw, sport))
    }
}

/// Turn a raw scoreboard payload into snapshots. Events that fail to parse
/// are logged and dropped; they never abort the rest of the batch.
pub fn parse_scoreboard(raw: &Value, sport: Sport) -> Scoreboard {
    let events = raw["events"].as_array().map(Vec::as_slice).unwrap_or(&[]);

    let games = events
        .iter()
        .filter_map(|ev| match parse_event(ev, sport) {
            Ok(game) => Some(game),
            Err(e) => {
                warn!(
                    sport = %sport,
                    event = ev["id"].as_str().unwrap_or("?"),
                    error = %e,
                    "Failed to parse scoreboard event"
                );
                None
            }
        })
        .collect();

    Scoreboard {
        sport,
        games,
        fetched_at: Utc::now(),
    }
}

pub fn parse_event(event: &Value, sport: Sport) -> Result<GameSnapshot, EventParseError> {
    let game_id = id_string(&event["id"]).ok_or(EventParseError::MissingId)?;

    let competition = event["competitions"]
        .get(0)
        .ok_or(EventParseError::MissingCompetition)?;
    let competitors = competition["competitors"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    // Home/away come from the explicit role tag, never from list order.
    let home_comp = find_competitor(competitors, "home")?;
    let away_comp = find_competitor(competitors, "away")?;
    let home = parse_competitor(home_comp)?;
    let away = parse_competitor(away_comp)?;

    let status_obj = &event["status"];
    let status_type = &status_obj["type"];
    let status = GameStatus::from_upstream(
        status_type["state"]
            .as_str()
            .filter(|s| !s.is_empty())
            .or_else(|| status_type["name"].as_str()),
    );

    let situation = competition["situation"]
        .as_object()
        .filter(|s| !s.is_empty())
        .map(|_| &competition["situation"]);

    let possession_id = situation.and_then(|s| id_string(&s["possession"]));
    let is_red_zone = situation
        .and_then(|s| s["isRedZone"].as_bool())
        .unwrap_or(false);

    // An id we cannot match to either team is dropped rather than used as
    // an abbreviation.
    let possession_abbr = possession_id.as_deref().and_then(|id| {
        if id == home.team_id {
            Some(home.abbreviation.clone())
        } else if id == away.team_id {
            Some(away.abbreviation.clone())
        } else {
            None
        }
    });

    let red_zone = RedZoneInfo {
        active: is_red_zone,
        team_abbr: possession_abbr,
        yard_line: situation.and_then(|s| as_u32(&s["yardLine"])),
    };

    let game_situation = match situation {
        Some(s) if status == GameStatus::InProgress => Some(GameSituation {
            possession_team_id: possession_id.clone(),
            down_distance: s["shortDownDistanceText"].as_str().map(str::to_string),
            field_position: s["possessionText"].as_str().map(str::to_string),
            is_red_zone,
            clock: status_obj["displayClock"].as_str().map(str::to_string),
            period: as_u32(&status_obj["period"]),
        }),
        _ => None,
    };

    let last_play = situation.and_then(|s| parse_last_play(&s["lastPlay"]));

    let last_update = status_type["detail"]
        .as_str()
        .and_then(parse_timestamp)
        .or_else(|| event["date"].as_str().and_then(parse_timestamp))
        .unwrap_or_else(Utc::now);

    Ok(GameSnapshot {
        game_id,
        sport,
        home,
        away,
        status,
        last_update,
        red_zone,
        situation: game_situation,
        last_play,
    })
}

fn find_competitor<'a>(
    competitors: &'a [Value],
    role: &'static str,
) -> Result<&'a Value, EventParseError> {
    competitors
        .iter()
        .find(|c| c["homeAway"].as_str() == Some(role))
        .ok_or(EventParseError::MissingCompetitor(role))
}

fn parse_competitor(comp: &Value) -> Result<TeamScore, EventParseError> {
    let team = &comp["team"];
    let score = match &comp["score"] {
        Value::Null => 0,
        Value::String(s) if s.trim().is_empty() => 0,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| EventParseError::InvalidScore(s.clone()))?,
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| EventParseError::InvalidScore(n.to_string()))?,
        other => return Err(EventParseError::InvalidScore(other.to_string())),
    };

    Ok(TeamScore {
        team_id: id_string(&team["id"]).unwrap_or_default(),
        abbreviation: team["abbreviation"].as_str().unwrap_or_default().to_string(),
        display_name: team["displayName"]
            .as_str()
            .or_else(|| team["name"].as_str())
            .unwrap_or_default()
            .to_string(),
        score,
    })
}

fn parse_last_play(play: &Value) -> Option<LastPlay> {
    let id = id_string(&play["id"])?;
    Some(LastPlay {
        id,
        type_code: as_u32(&play["type"]["id"]),
        description: play["text"].as_str().unwrap_or_default().to_string(),
        team_id: id_string(&play["team"]["id"]),
        score_value: as_u32(&play["scoreValue"]),
    })
}

/// ESPN sends ids as strings but occasionally as bare numbers.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u32(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|x| u32::try_from(x).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts RFC 3339 and ESPN's minute-precision `2024-09-08T17:00Z`.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%MZ")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event(state: &str, situation: Value) -> Value {
        json!({
            "id": "401772922",
            "date": "2025-09-07T17:00Z",
            "status": {
                "displayClock": "4:12",
                "period": 2,
                "type": { "state": state, "name": "STATUS_IN_PROGRESS", "detail": "4:12 - 2nd Quarter" }
            },
            "competitions": [{
                "competitors": [
                    {
                        "homeAway": "away",
                        "score": "7",
                        "team": { "id": "17", "abbreviation": "NE", "displayName": "New England Patriots" }
                    },
                    {
                        "homeAway": "home",
                        "score": "14",
                        "team": { "id": "2", "abbreviation": "BUF", "displayName": "Buffalo Bills" }
                    }
                ],
                "situation": situation
            }]
        })
    }

    #[test]
    fn test_home_away_by_role_tag() {
        let game = parse_event(&event("in", json!({})), Sport::Nfl).unwrap();
        assert_eq!(game.home.abbreviation, "BUF");
        assert_eq!(game.home.score, 14);
        assert_eq!(game.away.abbreviation, "NE");
        assert_eq!(game.away.score, 7);
        assert_eq!(game.status, GameStatus::InProgress);
    }

    #[test]
    fn test_red_zone_possession_resolved() {
        let sit = json!({
            "possession": "2",
            "isRedZone": true,
            "yardLine": 12,
            "shortDownDistanceText": "2nd & 5",
            "possessionText": "NE 12"
        });
        let game = parse_event(&event("in", sit), Sport::Nfl).unwrap();
        assert!(game.red_zone.active);
        assert_eq!(game.red_zone.team_abbr.as_deref(), Some("BUF"));
        assert_eq!(game.red_zone.yard_line, Some(12));

        let situation = game.situation.unwrap();
        assert_eq!(situation.possession_team_id.as_deref(), Some("2"));
        assert_eq!(situation.down_distance.as_deref(), Some("2nd & 5"));
        assert_eq!(situation.clock.as_deref(), Some("4:12"));
        assert_eq!(situation.period, Some(2));
    }

    #[test]
    fn test_unresolved_possession_is_not_an_abbreviation() {
        let sit = json!({ "possession": "999", "isRedZone": true });
        let game = parse_event(&event("in", sit), Sport::Nfl).unwrap();
        assert!(game.red_zone.active);
        assert_eq!(game.red_zone.team_abbr, None);
    }

    #[test]
    fn test_situation_only_while_in_progress() {
        let sit = json!({ "possession": "2", "isRedZone": false });
        let game = parse_event(&event("post", sit), Sport::Nfl).unwrap();
        assert_eq!(game.status, GameStatus::Final);
        assert!(game.situation.is_none());
    }

    #[test]
    fn test_last_play_parsed() {
        let sit = json!({
            "possession": "17",
            "lastPlay": {
                "id": "4017729221234",
                "type": { "id": "7", "text": "Sack" },
                "text": "(Shotgun) D.Maye sacked at NE 46 for -2 yards (G.Rousseau).",
                "team": { "id": "17" }
            }
        });
        let game = parse_event(&event("in", sit), Sport::Nfl).unwrap();
        let play = game.last_play.unwrap();
        assert_eq!(play.id, "4017729221234");
        assert_eq!(play.type_code, Some(7));
        assert_eq!(play.team_id.as_deref(), Some("17"));
        assert_eq!(play.score_value, None);
    }

    #[test]
    fn test_timestamp_fallbacks() {
        // detail is free text, so the event date is used
        let game = parse_event(&event("in", json!({})), Sport::Nfl).unwrap();
        assert_eq!(
            game.last_update,
            Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap()
        );

        let mut ev = event("in", json!({}));
        ev["date"] = json!("not a date");
        let before = Utc::now();
        let game = parse_event(&ev, Sport::Nfl).unwrap();
        assert!(game.last_update >= before);
    }

    #[test]
    fn test_bad_event_does_not_abort_batch() {
        let mut broken = event("in", json!({}));
        broken["competitions"][0]["competitors"][0]["score"] = json!("abc");
        let mut no_home = event("pre", json!({}));
        no_home["competitions"][0]["competitors"][1]["homeAway"] = json!("neutral");

        let raw = json!({ "events": [broken, event("in", json!({})), no_home] });
        let board = parse_scoreboard(&raw, Sport::Nfl);
        assert_eq!(board.games.len(), 1);
        assert_eq!(board.sport, Sport::Nfl);
    }

    #[test]
    fn test_missing_events_is_empty() {
        let board = parse_scoreboard(&json!({}), Sport::CollegeFootball);
        assert!(board.games.is_empty());
    }

    #[test]
    fn test_scoreboard_url() {
        let client =
            EspnClient::new(Some("http://localhost:9000/"), Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.scoreboard_url(Sport::CollegeFootball),
            "http://localhost:9000/college-football/scoreboard"
        );
    }
}
