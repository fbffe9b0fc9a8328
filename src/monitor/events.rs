use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::plays::DefensivePlay;
use crate::scoreboard::Sport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Touchdown,
    FieldGoal,
    ExtraPoint,
    TwoPointConversion,
    /// Any other positive score change (e.g. a 7 or 8 point jump between polls)
    Score,
    Victory,
    RedZoneStart,
    RedZoneStop,
    Sack,
    Interception,
    FumbleRecovery,
    Safety,
    MonitoringRemoved,
}

impl EventKind {
    /// Classify a positive score delta by its value. A 7 or 8 point jump means
    /// the try was folded into the same poll and is reported as a plain score.
    pub fn from_score_delta(delta: u32) -> EventKind {
        match delta {
            6 => EventKind::Touchdown,
            3 => EventKind::FieldGoal,
            1 => EventKind::ExtraPoint,
            2 => EventKind::TwoPointConversion,
            _ => EventKind::Score,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Touchdown => "touchdown",
            EventKind::FieldGoal => "field_goal",
            EventKind::ExtraPoint => "extra_point",
            EventKind::TwoPointConversion => "two_point_conversion",
            EventKind::Score => "score",
            EventKind::Victory => "victory",
            EventKind::RedZoneStart => "red_zone_start",
            EventKind::RedZoneStop => "red_zone_stop",
            EventKind::Sack => "sack",
            EventKind::Interception => "interception",
            EventKind::FumbleRecovery => "fumble_recovery",
            EventKind::Safety => "safety",
            EventKind::MonitoringRemoved => "monitoring_removed",
        }
    }
}

impl From<DefensivePlay> for EventKind {
    fn from(play: DefensivePlay) -> Self {
        match play {
            DefensivePlay::Sack => EventKind::Sack,
            DefensivePlay::Interception => EventKind::Interception,
            DefensivePlay::FumbleRecovery => EventKind::FumbleRecovery,
            DefensivePlay::Safety => EventKind::Safety,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision that something worth celebrating (or cleaning up) happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CelebrationEvent {
    pub sport: Sport,
    /// Team abbreviation the event is for. Empty for removals.
    pub team: String,
    pub kind: EventKind,
    pub game_id: String,
    pub detail: String,
    /// Score delta for scoring kinds
    pub points: Option<u32>,
    pub detected_at: DateTime<Utc>,
}

impl CelebrationEvent {
    pub fn new(sport: Sport, team: &str, kind: EventKind, game_id: &str, detail: String) -> Self {
        CelebrationEvent {
            sport,
            team: team.to_string(),
            kind,
            game_id: game_id.to_string(),
            detail,
            points: None,
            detected_at: Utc::now(),
        }
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = Some(points);
        self
    }
}

/// Consumer of emitted events (history log, light controller, notifications).
#[async_trait]
pub trait CelebrationSink: Send + Sync {
    async fn emit(&self, event: &CelebrationEvent) -> Result<()>;
}

#[async_trait]
impl CelebrationSink for mpsc::Sender<CelebrationEvent> {
    async fn emit(&self, event: &CelebrationEvent) -> Result<()> {
        self.send(event.clone())
            .await
            .map_err(|_| anyhow::anyhow!("celebration channel closed"))
    }
}

/// Delivers every event to each sink in order. A failing sink is logged and
/// the remaining sinks still receive the event.
#[derive(Clone, Default)]
pub struct SinkFanout {
    sinks: Vec<Arc<dyn CelebrationSink>>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Arc<dyn CelebrationSink>>) -> Self {
        SinkFanout { sinks }
    }
}

#[async_trait]
impl CelebrationSink for SinkFanout {
    async fn emit(&self, event: &CelebrationEvent) -> Result<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event).await {
                warn!(kind = %event.kind, game = %event.game_id, error = %e, "Celebration sink failed");
            }
        }
        Ok(())
    }
}
