use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::models::MonitoringRequest;
use crate::db::Database;
use crate::scoreboard::Sport;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Sports with a configured monitor, reported by `/api/status`.
    pub sports: Vec<Sport>,
}

/// Build the Axum router for the monitoring API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/monitoring",
            get(list_monitoring_handler).post(add_monitoring_handler),
        )
        .route("/api/monitoring/:game_id", delete(remove_monitoring_handler))
        .route("/api/history", get(history_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub sports: Vec<Sport>,
    pub monitored_games: usize,
}

/// Checks a monitoring request before it reaches the store.
pub fn validate_request(req: &MonitoringRequest) -> Result<(), String> {
    if req.game_id.trim().is_empty() {
        return Err("game_id must not be empty".into());
    }
    if req.monitored_teams.is_empty() || req.monitored_teams.len() > 2 {
        return Err("monitored_teams must name one or two teams".into());
    }
    for team in &req.monitored_teams {
        if *team != req.home_team_abbr && *team != req.away_team_abbr {
            return Err(format!(
                "team {} is not playing in game {}",
                team, req.game_id
            ));
        }
    }
    if req.monitored_teams.len() == 2 && req.monitored_teams[0] == req.monitored_teams[1] {
        return Err("monitored_teams contains a duplicate".into());
    }
    Ok(())
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// GET /api/monitoring
async fn list_monitoring_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .get_monitored_games()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// POST /api/monitoring
async fn add_monitoring_handler(
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<MonitoringRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.home_team_abbr = req.home_team_abbr.trim().to_uppercase();
    req.away_team_abbr = req.away_team_abbr.trim().to_uppercase();
    req.monitored_teams = req
        .monitored_teams
        .iter()
        .map(|t| t.trim().to_uppercase())
        .collect();
    validate_request(&req).map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    state
        .db
        .add_monitoring(&req)
        .map(|g| (StatusCode::CREATED, Json(g)))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// DELETE /api/monitoring/:game_id
async fn remove_monitoring_handler(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.db.delete_monitoring(&game_id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            format!("game {} is not monitored", game_id),
        )),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// GET /api/history?limit=50
async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .recent_celebrations(clamp_limit(q.limit))
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// GET /api/status
async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let monitored_games = state
        .db
        .get_monitored_games()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .len();
    Ok(Json(StatusResponse {
        sports: state.sports.clone(),
        monitored_games,
    }))
}
