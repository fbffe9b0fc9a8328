use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

pub mod models;
use models::*;

use crate::monitor::{CelebrationEvent, CelebrationSink, MonitoringStore};
use crate::scoreboard::Sport;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Monitoring preferences ───────────────────────────────────────────────

    /// Add a game to monitoring, or replace its team selection if present.
    pub fn add_monitoring(&self, req: &MonitoringRequest) -> Result<MonitoredGame> {
        let now = Utc::now();
        let teams_json = serde_json::to_string(&req.monitored_teams)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO monitored_games (
                game_id, sport, home_team_abbr, away_team_abbr,
                monitored_teams, created_at, updated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(game_id) DO UPDATE SET
                monitored_teams=excluded.monitored_teams,
                updated_at=excluded.updated_at",
            params![
                req.game_id,
                req.sport.as_str(),
                req.home_team_abbr,
                req.away_team_abbr,
                teams_json,
                now,
                now,
            ],
        )?;
        drop(conn);
        info!(game = %req.game_id, teams = ?req.monitored_teams, "Added monitoring");

        self.get_monitored_game(&req.game_id)?
            .ok_or_else(|| anyhow!("monitored game {} vanished after insert", req.game_id))
    }

    pub fn get_monitored_game(&self, game_id: &str) -> Result<Option<MonitoredGame>> {
        let conn = self.conn()?;
        let game = conn
            .query_row(
                "SELECT game_id, sport, home_team_abbr, away_team_abbr,
                        monitored_teams, created_at, updated_at
                 FROM monitored_games WHERE game_id=?1",
                params![game_id],
                map_monitored_game,
            )
            .optional()?;
        Ok(game)
    }

    /// All monitored games, newest first
    pub fn get_monitored_games(&self) -> Result<Vec<MonitoredGame>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, sport, home_team_abbr, away_team_abbr,
                    monitored_teams, created_at, updated_at
             FROM monitored_games ORDER BY created_at DESC",
        )?;
        let games = stmt
            .query_map([], map_monitored_game)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(games)
    }

    /// Remove a game from monitoring; returns whether a row existed
    pub fn delete_monitoring(&self, game_id: &str) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM monitored_games WHERE game_id=?1", params![game_id])?;
        if deleted > 0 {
            info!(game = %game_id, "Removed monitoring");
        }
        Ok(deleted > 0)
    }

    pub fn team_is_monitored(&self, game_id: &str, team_abbr: &str) -> Result<bool> {
        let conn = self.conn()?;
        let teams_json: Option<String> = conn
            .query_row(
                "SELECT monitored_teams FROM monitored_games WHERE game_id=?1",
                params![game_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(teams_json) = teams_json else {
            return Ok(false);
        };
        let teams: Vec<String> = serde_json::from_str(&teams_json)
            .with_context(|| format!("Corrupt monitored_teams for game {}", game_id))?;
        Ok(teams.iter().any(|t| t == team_abbr))
    }

    /// Remove several finished games at once; returns the number removed
    pub fn cleanup_finished_games(&self, game_ids: &[String]) -> Result<usize> {
        if game_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM monitored_games WHERE game_id=?1")?;
            for id in game_ids {
                count += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        if count > 0 {
            info!(count, "Cleaned up finished games from monitoring");
        }
        Ok(count)
    }

    // ── Celebration history ──────────────────────────────────────────────────

    pub fn record_celebration(
        &self,
        sport: &str,
        team: &str,
        event_type: &str,
        game_id: &str,
        detail: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO celebrations (timestamp, sport, team, event_type, game_id, detail)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![Utc::now(), sport, team, event_type, game_id, detail],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent celebrations, newest first
    pub fn recent_celebrations(&self, limit: i64) -> Result<Vec<CelebrationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, sport, team, event_type, game_id, detail
             FROM celebrations ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(CelebrationRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    sport: row.get(2)?,
                    team: row.get(3)?,
                    event_type: row.get(4)?,
                    game_id: row.get(5)?,
                    detail: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl MonitoringStore for Database {
    async fn is_team_monitored(&self, game_id: &str, team_abbr: &str) -> Result<bool> {
        self.team_is_monitored(game_id, team_abbr)
    }

    async fn remove_monitoring(&self, game_id: &str) -> Result<bool> {
        self.delete_monitoring(game_id)
    }
}

/// The history log records every emitted event.
#[async_trait]
impl CelebrationSink for Database {
    async fn emit(&self, event: &CelebrationEvent) -> Result<()> {
        self.record_celebration(
            event.sport.as_str(),
            &event.team,
            event.kind.as_str(),
            &event.game_id,
            Some(event.detail.as_str()),
        )?;
        Ok(())
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_monitored_game(row: &rusqlite::Row) -> rusqlite::Result<MonitoredGame> {
    let sport: String = row.get(1)?;
    let teams_json: String = row.get(4)?;
    let created_at: DateTime<Utc> = row.get(5)?;
    let updated_at: DateTime<Utc> = row.get(6)?;
    Ok(MonitoredGame {
        game_id: row.get(0)?,
        sport: Sport::parse(&sport).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown sport '{}'", sport).into(),
            )
        })?,
        home_team_abbr: row.get(2)?,
        away_team_abbr: row.get(3)?,
        monitored_teams: serde_json::from_str(&teams_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at,
        updated_at,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS monitored_games (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id         TEXT    NOT NULL UNIQUE,
    sport           TEXT    NOT NULL,
    home_team_abbr  TEXT    NOT NULL,
    away_team_abbr  TEXT    NOT NULL,
    monitored_teams TEXT    NOT NULL,
    created_at      TEXT    NOT NULL,
    updated_at      TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS celebrations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT    NOT NULL,
    sport       TEXT,
    team        TEXT,
    event_type  TEXT,
    game_id     TEXT,
    detail      TEXT
);

CREATE INDEX IF NOT EXISTS idx_celebrations_game ON celebrations(game_id);
"#;
