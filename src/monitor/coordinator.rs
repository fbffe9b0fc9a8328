use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::events::CelebrationSink;
use super::store::MonitoringStore;
use super::{MonitorConfig, SportMonitor};
use crate::scoreboard::{ScoreboardSource, Sport};

/// Owns one [`SportMonitor`] per enabled sport and only ever starts, stops
/// and inspects them; detection state stays inside each monitor.
pub struct MonitoringCoordinator {
    source: Arc<dyn ScoreboardSource>,
    store: Arc<dyn MonitoringStore>,
    sink: Arc<dyn CelebrationSink>,
    monitors: HashMap<Sport, SportMonitor>,
}

impl MonitoringCoordinator {
    pub fn new(
        source: Arc<dyn ScoreboardSource>,
        store: Arc<dyn MonitoringStore>,
        sink: Arc<dyn CelebrationSink>,
    ) -> Self {
        MonitoringCoordinator {
            source,
            store,
            sink,
            monitors: HashMap::new(),
        }
    }

    /// Build monitors for the given configs. A later config for the same
    /// sport replaces the earlier one, keeping one monitor per sport.
    pub async fn configure(&mut self, configs: Vec<MonitorConfig>) {
        for cfg in configs {
            let sport = cfg.sport;
            let monitor = SportMonitor::new(
                cfg,
                Arc::clone(&self.source),
                Arc::clone(&self.store),
                Arc::clone(&self.sink),
            );
            if let Some(mut previous) = self.monitors.insert(sport, monitor) {
                previous.stop().await;
            }
        }
        info!(sports = ?self.sports(), "Monitoring configured");
    }

    pub fn sports(&self) -> Vec<Sport> {
        let mut sports: Vec<Sport> = self.monitors.keys().copied().collect();
        sports.sort_by_key(|s| s.as_str());
        sports
    }

    pub fn running_sports(&self) -> Vec<Sport> {
        let mut sports: Vec<Sport> = self
            .monitors
            .values()
            .filter(|m| m.is_running())
            .map(|m| m.sport())
            .collect();
        sports.sort_by_key(|s| s.as_str());
        sports
    }

    pub fn start_all(&mut self) {
        for monitor in self.monitors.values_mut() {
            monitor.start();
        }
        info!(count = self.monitors.len(), "All monitors started");
    }

    /// Stop every monitor concurrently and wait until all tasks are gone.
    pub async fn stop_all(&mut self) {
        join_all(self.monitors.values_mut().map(|m| m.stop())).await;
        info!("All monitors stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::super::detector::tests::{FakeStore, RecordingSink};
    use super::*;
    use crate::scoreboard::Scoreboard;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct EmptySource;

    #[async_trait]
    impl ScoreboardSource for EmptySource {
        fn name(&self) -> &str {
            "empty"
        }

        async fn fetch_scoreboard(&self, sport: Sport) -> Result<Scoreboard> {
            Ok(Scoreboard {
                sport,
                games: vec![],
                fetched_at: Utc::now(),
            })
        }
    }

    fn coordinator() -> MonitoringCoordinator {
        MonitoringCoordinator::new(
            Arc::new(EmptySource),
            Arc::new(FakeStore::default()),
            Arc::new(RecordingSink::default()),
        )
    }

    fn cfg(sport: Sport) -> MonitorConfig {
        MonitorConfig {
            sport,
            poll_interval: Duration::from_secs(3600),
            favorite_teams: vec![],
        }
    }

    #[tokio::test]
    async fn test_one_monitor_per_sport() {
        let mut coord = coordinator();
        coord
            .configure(vec![cfg(Sport::Nfl), cfg(Sport::CollegeFootball), cfg(Sport::Nfl)])
            .await;
        assert_eq!(coord.sports(), vec![Sport::CollegeFootball, Sport::Nfl]);
    }

    #[tokio::test]
    async fn test_start_and_stop_all() {
        let mut coord = coordinator();
        coord
            .configure(vec![cfg(Sport::Nfl), cfg(Sport::CollegeFootball)])
            .await;

        coord.start_all();
        assert_eq!(coord.running_sports().len(), 2);

        tokio::time::timeout(Duration::from_secs(2), coord.stop_all())
            .await
            .expect("stop_all should not wait for the poll interval");
        assert!(coord.running_sports().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_before_start() {
        let mut coord = coordinator();
        coord.configure(vec![cfg(Sport::Nfl)]).await;
        coord.stop_all().await;
        assert!(coord.running_sports().is_empty());
    }
}
