//! Per-game detection state machine.
//!
//! Each poll delivers full snapshots, never deltas, so every event is derived
//! by comparing a snapshot against what this detector recorded for the same
//! game id on the previous poll.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::events::{CelebrationEvent, CelebrationSink, EventKind};
use super::plays::{attribute_team, classify_play};
use super::store::MonitoringStore;
use crate::scoreboard::{GameSnapshot, GameStatus, LastPlay, Scoreboard, Sport, TeamScore};

/// Games absent from the feed this long are forgotten.
const STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Default)]
struct GameState {
    /// Last recorded score per team abbreviation
    scores: HashMap<String, u32>,
    status: Option<GameStatus>,
    red_zone_active: bool,
    /// Team that was in the red zone and watched on the previous poll
    red_zone_team: Option<String>,
    /// Every play id already handled, so a stale snapshot replaying an older
    /// play cannot trigger it again. Empty until the baseline play is seen.
    seen_plays: HashSet<String>,
    last_seen: Option<Instant>,
}

/// The one red-zone ambient signal a monitor may have running.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AmbientSignal {
    game_id: String,
    team: String,
}

pub struct Detector {
    sport: Sport,
    favorite_teams: Vec<String>,
    store: Arc<dyn MonitoringStore>,
    sink: Arc<dyn CelebrationSink>,
    games: HashMap<String, GameState>,
    ambient: Option<AmbientSignal>,
}

impl Detector {
    pub fn new(
        sport: Sport,
        favorite_teams: Vec<String>,
        store: Arc<dyn MonitoringStore>,
        sink: Arc<dyn CelebrationSink>,
    ) -> Self {
        Detector {
            sport,
            favorite_teams,
            store,
            sink,
            games: HashMap::new(),
            ambient: None,
        }
    }

    pub fn tracked_games(&self) -> usize {
        self.games.len()
    }

    /// Process every game of one poll, strictly in feed order.
    pub async fn process_scoreboard(&mut self, board: &Scoreboard) {
        for game in &board.games {
            if !self.passes_filter(game) {
                debug!(
                    sport = %self.sport,
                    game = %game.game_id,
                    "Skipping game without a favorite team"
                );
                continue;
            }
            self.process_game(game).await;
        }
        self.prune_stale().await;
    }

    /// An empty favorites list lets every game through; the watch lookup in
    /// the monitoring store still gates every emission.
    fn passes_filter(&self, game: &GameSnapshot) -> bool {
        self.favorite_teams.is_empty() || game.involves_any(&self.favorite_teams)
    }

    pub async fn process_game(&mut self, game: &GameSnapshot) {
        let mut state = self.games.remove(&game.game_id).unwrap_or_default();
        let previous_status = state.status;

        // 1. score deltas
        if game.status == GameStatus::InProgress && previous_status.is_some() {
            for team in game.teams() {
                if team.abbreviation.is_empty() {
                    continue;
                }
                if let Some(&previous) = state.scores.get(&team.abbreviation) {
                    if team.score > previous {
                        self.handle_score(game, team, team.score - previous).await;
                    }
                }
            }
        }
        for team in game.teams() {
            state.scores.insert(team.abbreviation.clone(), team.score);
        }

        // 2. victory, only on the edge into FINAL
        if game.status == GameStatus::Final
            && matches!(previous_status, Some(s) if s != GameStatus::Final)
        {
            self.handle_final(game).await;
        }
        state.status = Some(game.status);

        // 3. red zone
        self.update_red_zone(game, &mut state).await;

        // 4. defensive plays
        if game.status == GameStatus::InProgress {
            if let Some(play) = &game.last_play {
                self.check_defensive_play(game, play, &mut state).await;
            }
        }

        state.last_seen = Some(Instant::now());
        self.games.insert(game.game_id.clone(), state);
    }

    async fn handle_score(&self, game: &GameSnapshot, team: &TeamScore, delta: u32) {
        if !self.is_watched(&game.game_id, &team.abbreviation).await {
            debug!(
                sport = %self.sport,
                team = %team.abbreviation,
                delta,
                game = %game.game_id,
                "Score change detected but team not monitored"
            );
            return;
        }

        let kind = EventKind::from_score_delta(delta);
        info!(
            sport = %self.sport,
            team = %team.abbreviation,
            delta,
            kind = %kind,
            game = %game.game_id,
            "Score change detected for monitored team"
        );
        let detail = format!(
            "{} +{} ({} {}-{} {})",
            team.abbreviation,
            delta,
            game.home.abbreviation,
            game.home.score,
            game.away.abbreviation,
            game.away.score
        );
        let event = CelebrationEvent::new(self.sport, &team.abbreviation, kind, &game.game_id, detail)
            .with_points(delta);
        self.emit(event).await;
    }

    async fn handle_final(&self, game: &GameSnapshot) {
        let final_score = game.score_line();
        let winner = match game.winner() {
            Some(winner) => Some((winner, self.is_watched(&game.game_id, &winner.abbreviation).await)),
            None => None,
        };
        match winner {
            Some((winner, true)) => {
                info!(
                    sport = %self.sport,
                    winner = %winner.abbreviation,
                    game = %game.game_id,
                    "Victory for monitored team: {}",
                    final_score
                );
                self.emit(CelebrationEvent::new(
                    self.sport,
                    &winner.abbreviation,
                    EventKind::Victory,
                    &game.game_id,
                    final_score.clone(),
                ))
                .await;
            }
            Some((winner, false)) => debug!(
                sport = %self.sport,
                winner = %winner.abbreviation,
                game = %game.game_id,
                "Game final, winner not monitored"
            ),
            None => info!(sport = %self.sport, game = %game.game_id, "Game final without a winner: {}", final_score),
        }

        let removed = match self.store.remove_monitoring(&game.game_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(sport = %self.sport, game = %game.game_id, error = %e, "Failed to remove finished game from monitoring");
                false
            }
        };
        if removed {
            info!(sport = %self.sport, game = %game.game_id, "Auto-removed finished game from monitoring");
            self.emit(CelebrationEvent::new(
                self.sport,
                "",
                EventKind::MonitoringRemoved,
                &game.game_id,
                "game_finished".to_string(),
            ))
            .await;
        }
    }

    async fn update_red_zone(&mut self, game: &GameSnapshot, state: &mut GameState) {
        let wanted = match &game.red_zone.team_abbr {
            Some(team) if game.red_zone.active => {
                if self.is_watched(&game.game_id, team).await {
                    Some(team.clone())
                } else {
                    None
                }
            }
            _ => None,
        };

        if game.red_zone.active && !state.red_zone_active && wanted.is_none() {
            debug!(
                sport = %self.sport,
                game = %game.game_id,
                team = game.red_zone.team_abbr.as_deref().unwrap_or("?"),
                "Red zone entered by unmonitored team"
            );
        }

        if wanted != state.red_zone_team {
            if let Some(previous) = state.red_zone_team.take() {
                self.stop_ambient(&game.game_id, &previous, "red zone ended").await;
            }
            if let Some(team) = &wanted {
                self.start_ambient(game, team).await;
            }
        }
        state.red_zone_team = wanted;
        state.red_zone_active = game.red_zone.active;
    }

    async fn start_ambient(&mut self, game: &GameSnapshot, team: &str) {
        if let Some(current) = self.ambient.take() {
            self.emit(CelebrationEvent::new(
                self.sport,
                &current.team,
                EventKind::RedZoneStop,
                &current.game_id,
                format!("preempted by {}", team),
            ))
            .await;
        }

        let detail = match game.red_zone.yard_line {
            Some(yard_line) => format!("{} in the red zone at the {}", team, yard_line),
            None => format!("{} in the red zone", team),
        };
        info!(sport = %self.sport, team, game = %game.game_id, "Red zone ambient started");
        self.emit(CelebrationEvent::new(self.sport, team, EventKind::RedZoneStart, &game.game_id, detail))
            .await;
        self.ambient = Some(AmbientSignal {
            game_id: game.game_id.clone(),
            team: team.to_string(),
        });
    }

    /// Stops the ambient signal only if it still belongs to this game/team;
    /// a signal that was already preempted has had its stop emitted.
    async fn stop_ambient(&mut self, game_id: &str, team: &str, reason: &str) {
        let owns_signal = self
            .ambient
            .as_ref()
            .is_some_and(|a| a.game_id == game_id && a.team == team);
        if !owns_signal {
            return;
        }
        self.ambient = None;
        info!(sport = %self.sport, team, game = %game_id, reason, "Red zone ambient stopped");
        self.emit(CelebrationEvent::new(
            self.sport,
            team,
            EventKind::RedZoneStop,
            game_id,
            reason.to_string(),
        ))
        .await;
    }

    async fn check_defensive_play(&self, game: &GameSnapshot, play: &LastPlay, state: &mut GameState) {
        let baseline = state.seen_plays.is_empty();
        if !state.seen_plays.insert(play.id.clone()) {
            return;
        }
        if baseline {
            // Joined mid-drive: nothing to compare against yet.
            debug!(sport = %self.sport, game = %game.game_id, play = %play.id, "Recorded baseline play");
            return;
        }

        let Some(kind) = classify_play(play.type_code, &play.description) else {
            return;
        };
        let Some(team) = attribute_team(kind, play, game) else {
            debug!(
                sport = %self.sport,
                game = %game.game_id,
                kind = kind.as_str(),
                "Could not attribute defensive play: {}",
                play.description
            );
            return;
        };
        if !self.is_watched(&game.game_id, &team).await {
            debug!(sport = %self.sport, team = %team, kind = kind.as_str(), "Defensive play for unmonitored team");
            return;
        }

        info!(
            sport = %self.sport,
            team = %team,
            kind = kind.as_str(),
            game = %game.game_id,
            "Defensive play detected: {}",
            play.description
        );
        self.emit(CelebrationEvent::new(
            self.sport,
            &team,
            kind.into(),
            &game.game_id,
            play.description.clone(),
        ))
        .await;
    }

    async fn prune_stale(&mut self) {
        let stale: Vec<String> = self
            .games
            .iter()
            .filter(|(_, g)| g.last_seen.is_some_and(|seen| seen.elapsed() > STALE_AFTER))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(state) = self.games.remove(&id) {
                if let Some(team) = state.red_zone_team {
                    self.stop_ambient(&id, &team, "game no longer reported").await;
                }
            }
        }
    }

    /// Store failures count as "not watched" so a flaky store never produces
    /// a celebration and never stalls the rest of the poll.
    async fn is_watched(&self, game_id: &str, team_abbr: &str) -> bool {
        match self.store.is_team_monitored(game_id, team_abbr).await {
            Ok(watched) => watched,
            Err(e) => {
                warn!(sport = %self.sport, game = %game_id, team = %team_abbr, error = %e, "Monitoring lookup failed");
                false
            }
        }
    }

    async fn emit(&self, event: CelebrationEvent) {
        if let Err(e) = self.sink.emit(&event).await {
            warn!(kind = %event.kind, game = %event.game_id, error = %e, "Failed to emit celebration");
        }
    }
}
