use anyhow::Result;
use clap::Parser;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

mod api;
mod config;
mod db;
mod monitor;
mod scoreboard;

use api::AppState;
use config::Config;
use db::Database;
use monitor::{CelebrationEvent, CelebrationSink, MonitoringCoordinator, SinkFanout};
use scoreboard::{EspnClient, GameStatus, ScoreboardSource, Sport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let espn: Arc<dyn ScoreboardSource> = Arc::new(EspnClient::new(
        Some(config.espn_base_url.as_str()),
        config.http_timeout(),
    )?);

    let monitor_configs = config.monitor_configs();
    let sports: Vec<Sport> = monitor_configs.iter().map(|c| c.sport).collect();
    cleanup_finished(&db, espn.as_ref(), &sports).await;

    // Celebration hand-off: history log plus an in-process consumer
    let (tx, mut rx) = mpsc::channel::<CelebrationEvent>(256);
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            info!(
                sport = %ev.sport,
                game = %ev.game_id,
                team = %ev.team,
                kind = %ev.kind,
                detail = %ev.detail,
                "Celebration"
            );
        }
    });
    let sinks: Vec<Arc<dyn CelebrationSink>> = vec![Arc::new(db.clone()), Arc::new(tx)];
    let sink = Arc::new(SinkFanout::new(sinks));

    let mut coordinator = MonitoringCoordinator::new(Arc::clone(&espn), Arc::new(db.clone()), sink);
    coordinator.configure(monitor_configs).await;
    coordinator.start_all();
    info!(running = ?coordinator.running_sports(), "Monitors running");

    let app = api::router(AppState {
        db: db.clone(),
        sports,
    });
    let addr: SocketAddr = config.api_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutdown requested");
        })
        .await;

    coordinator.stop_all().await;
    served?;
    Ok(())
}

/// Drop monitoring rows for games that finished while the process was down.
async fn cleanup_finished(db: &Database, source: &dyn ScoreboardSource, sports: &[Sport]) {
    let monitored: HashSet<String> = match db.get_monitored_games() {
        Ok(games) => games.into_iter().map(|g| g.game_id).collect(),
        Err(e) => {
            warn!("Could not list monitored games: {}", e);
            return;
        }
    };
    if monitored.is_empty() {
        return;
    }

    let mut finished = Vec::new();
    for sport in sports {
        match source.fetch_scoreboard(*sport).await {
            Ok(board) => finished.extend(
                board
                    .games
                    .into_iter()
                    .filter(|g| g.status == GameStatus::Final && monitored.contains(&g.game_id))
                    .map(|g| g.game_id),
            ),
            Err(e) => warn!(sport = %sport, "Startup scoreboard fetch failed: {}", e),
        }
    }

    if let Err(e) = db.cleanup_finished_games(&finished) {
        warn!("Failed to clean up finished games: {}", e);
    }
}
