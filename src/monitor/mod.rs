pub mod coordinator;
pub mod detector;
pub mod events;
pub mod plays;
pub mod store;

pub use coordinator::MonitoringCoordinator;
pub use detector::Detector;
pub use events::{CelebrationEvent, CelebrationSink, EventKind, SinkFanout};
pub use store::MonitoringStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::scoreboard::{ScoreboardSource, Sport};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub sport: Sport,
    pub poll_interval: Duration,
    /// Pre-filter: when non-empty, only games involving one of these
    /// abbreviations are processed.
    pub favorite_teams: Vec<String>,
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Detector>,
}

/// Polls one sport's scoreboard and feeds every game through a [`Detector`].
///
/// The detector is owned by the polling task while it runs and handed back
/// on a clean stop, so a restart keeps its per-game baselines.
pub struct SportMonitor {
    config: MonitorConfig,
    source: Arc<dyn ScoreboardSource>,
    store: Arc<dyn MonitoringStore>,
    sink: Arc<dyn CelebrationSink>,
    detector: Option<Detector>,
    task: Option<RunningTask>,
}

impl SportMonitor {
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn ScoreboardSource>,
        store: Arc<dyn MonitoringStore>,
        sink: Arc<dyn CelebrationSink>,
    ) -> Self {
        let detector = Detector::new(
            config.sport,
            config.favorite_teams.clone(),
            Arc::clone(&store),
            Arc::clone(&sink),
        );
        SportMonitor {
            config,
            source,
            store,
            sink,
            detector: Some(detector),
            task: None,
        }
    }

    fn fresh_detector(&self) -> Detector {
        Detector::new(
            self.config.sport,
            self.config.favorite_teams.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
        )
    }

    pub fn sport(&self) -> Sport {
        self.config.sport
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Spawn the polling task. No-op if already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let Some(detector) = self.detector.take() else {
            warn!(sport = %self.config.sport, "Monitor has no detector, not starting");
            return;
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.config.clone(),
            Arc::clone(&self.source),
            detector,
            shutdown_rx,
        ));
        self.task = Some(RunningTask { shutdown, handle });
    }

    /// Signal the polling task and wait for it to finish. Safe to call on a
    /// monitor that was never started. A task that panicked leaves the
    /// monitor restartable with an empty detector.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.shutdown.send(true);
        match task.handle.await {
            Ok(detector) => self.detector = Some(detector),
            Err(e) => {
                // per-game baselines are lost with the task; start over clean
                error!(sport = %self.config.sport, error = %e, "Monitor task ended abnormally");
                self.detector = Some(self.fresh_detector());
            }
        }
        info!(sport = %self.config.sport, "Monitor stopped");
    }
}

/// fetch → process → sleep, until told to stop. Both awaits race the
/// shutdown signal so a stop never waits out a full interval.
async fn run_loop(
    config: MonitorConfig,
    source: Arc<dyn ScoreboardSource>,
    mut detector: Detector,
    mut shutdown: watch::Receiver<bool>,
) -> Detector {
    info!(
        sport = %config.sport,
        source = source.name(),
        interval = ?config.poll_interval,
        favorites = ?config.favorite_teams,
        "Starting monitor"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let fetched = tokio::select! {
            _ = shutdown.changed() => break,
            res = source.fetch_scoreboard(config.sport) => res,
        };

        match fetched {
            Ok(board) => {
                detector.process_scoreboard(&board).await;
                debug!(
                    sport = %config.sport,
                    games = board.games.len(),
                    tracked = detector.tracked_games(),
                    "Poll processed"
                );
            }
            Err(e) => error!(sport = %config.sport, error = %e, "Monitor loop error"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    detector
}

#[cfg(test)]
mod tests {
    use super::detector::tests::{game, FakeStore, RecordingSink};
    use super::*;
    use crate::scoreboard::{GameStatus, Scoreboard};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of scoreboards, then repeats the last one.
    struct ScriptedSource {
        script: Mutex<Vec<Result<Vec<(u32, u32)>, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<(u32, u32)>, String>>) -> Self {
            ScriptedSource {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ScoreboardSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_scoreboard(&self, sport: Sport) -> Result<Scoreboard> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let step = {
                let script = self.script.lock().unwrap();
                script[n.min(script.len() - 1)].clone()
            };
            let scores = step.map_err(anyhow::Error::msg)?;
            Ok(Scoreboard {
                sport,
                games: scores
                    .into_iter()
                    .map(|(h, a)| game("g1", GameStatus::InProgress, h, a))
                    .collect(),
                fetched_at: Utc::now(),
            })
        }
    }

    /// Never answers, so a stop has to interrupt the fetch.
    struct HangingSource;

    #[async_trait]
    impl ScoreboardSource for HangingSource {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn fetch_scoreboard(&self, _sport: Sport) -> Result<Scoreboard> {
            std::future::pending().await
        }
    }

    /// Panics on the first fetch, then serves empty scoreboards.
    #[derive(Default)]
    struct PanicOnceSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScoreboardSource for PanicOnceSource {
        fn name(&self) -> &str {
            "panic-once"
        }

        async fn fetch_scoreboard(&self, sport: Sport) -> Result<Scoreboard> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("upstream payload blew up the parser");
            }
            Ok(Scoreboard {
                sport,
                games: vec![],
                fetched_at: Utc::now(),
            })
        }
    }

    fn config(interval: Duration) -> MonitorConfig {
        MonitorConfig {
            sport: Sport::Nfl,
            poll_interval: interval,
            favorite_teams: vec![],
        }
    }

    async fn wait_for_calls(source: &ScriptedSource, n: usize) {
        for _ in 0..200 {
            if source.calls.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("source was polled fewer than {} times", n);
    }

    #[tokio::test]
    async fn test_loop_survives_fetch_errors() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![(0, 0)]),
            Err("connection reset".into()),
            Ok(vec![(6, 0)]),
        ]));
        let store = Arc::new(FakeStore::default());
        store.watch("g1", "BUF");
        let sink = Arc::new(RecordingSink::default());

        let mut monitor = SportMonitor::new(
            config(Duration::from_millis(5)),
            source.clone(),
            store,
            sink.clone(),
        );
        monitor.start();
        assert!(monitor.is_running());
        wait_for_calls(&source, 4).await;
        monitor.stop().await;

        assert!(!monitor.is_running());
        assert_eq!(sink.take(), vec![(EventKind::Touchdown, "BUF".to_string())]);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![])]));
        let mut monitor = SportMonitor::new(
            config(Duration::from_secs(3600)),
            source.clone(),
            Arc::new(FakeStore::default()),
            Arc::new(RecordingSink::default()),
        );
        monitor.start();
        wait_for_calls(&source, 1).await;

        tokio::time::timeout(Duration::from_secs(2), monitor.stop())
            .await
            .expect("stop should not wait for the poll interval");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_fetch() {
        let mut monitor = SportMonitor::new(
            config(Duration::from_secs(1)),
            Arc::new(HangingSource),
            Arc::new(FakeStore::default()),
            Arc::new(RecordingSink::default()),
        );
        monitor.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(2), monitor.stop())
            .await
            .expect("stop should interrupt an in-flight fetch");
    }

    #[tokio::test]
    async fn test_restart_keeps_baselines() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![(3, 0)])]));
        let store = Arc::new(FakeStore::default());
        store.watch("g1", "BUF");
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = SportMonitor::new(
            config(Duration::from_millis(5)),
            source.clone(),
            store,
            sink.clone(),
        );

        monitor.start();
        wait_for_calls(&source, 2).await;
        monitor.stop().await;

        assert!(sink.take().is_empty());

        // a fresh detector would treat 6-0 as a first sighting and stay quiet
        *source.script.lock().unwrap() = vec![Ok(vec![(6, 0)])];
        monitor.start();
        wait_for_calls(&source, 4).await;
        monitor.stop().await;

        assert_eq!(sink.take(), vec![(EventKind::FieldGoal, "BUF".to_string())]);
    }

    #[tokio::test]
    async fn test_restart_after_task_panic() {
        let source = Arc::new(PanicOnceSource::default());
        let mut monitor = SportMonitor::new(
            config(Duration::from_millis(5)),
            source.clone(),
            Arc::new(FakeStore::default()),
            Arc::new(RecordingSink::default()),
        );

        monitor.start();
        for _ in 0..200 {
            if !monitor.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        monitor.stop().await;
        assert!(!monitor.is_running());

        monitor.start();
        assert!(monitor.is_running());
        for _ in 0..200 {
            if source.calls.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(source.calls.load(Ordering::SeqCst) >= 2);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut monitor = SportMonitor::new(
            config(Duration::from_secs(1)),
            Arc::new(HangingSource),
            Arc::new(FakeStore::default()),
            Arc::new(RecordingSink::default()),
        );
        monitor.stop().await;
        assert!(!monitor.is_running());
    }
}
