use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::models::Snapshot;
use crate::services::data_service::{DataService, LoadEvent, RefreshPoller};

pub struct DataSession {
    service: Arc<DataService>,
    receiver: Option<Receiver<LoadEvent>>,
    snapshot: Option<Snapshot>,
    from_cache: bool,
    last_error: Option<String>,
    poller: RefreshPoller,
}

impl DataSession {
    pub fn new(service: Arc<DataService>) -> Self {
        let interval = Duration::from_secs(service.config().refresh.poll_interval_seconds);
        Self {
            service,
            receiver: None,
            snapshot: None,
            from_cache: false,
            last_error: None,
            poller: RefreshPoller::new(interval),
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.request(false);
        self.poller.start(now);
    }

    pub fn stop(&mut self) {
        if self.poller.is_running() {
            info!("Background refresh stopped");
        }
        self.poller.stop();
        self.receiver = None;
    }

    /// Starts a load; a load already in flight keeps running but its result
    /// is no longer observed.
    pub fn request(&mut self, force: bool) {
        if self.receiver.is_some() {
            debug!("Superseding in-flight load");
        }
        self.receiver = Some(self.service.spawn_load(force));
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        if self.poller.due(now) {
            if self.is_loading() {
                debug!("Background refresh skipped, a load is in flight");
            } else {
                info!("Background refresh");
                self.request(true);
            }
        }
        self.pump()
    }

    pub fn pump(&mut self) -> bool {
        let mut updated = false;
        loop {
            let event = {
                let Some(rx) = &self.receiver else {
                    break;
                };
                rx.try_recv()
            };
            match event {
                Ok(LoadEvent::Started { force }) => {
                    debug!("Load started (force={})", force);
                }
                Ok(LoadEvent::Finished {
                    snapshot,
                    from_cache,
                }) => {
                    info!(
                        "Snapshot ready: {} entries, generated {}{}",
                        snapshot.entries.len(),
                        snapshot.generated_at,
                        if from_cache { " (cached)" } else { "" }
                    );
                    self.snapshot = Some(*snapshot);
                    self.from_cache = from_cache;
                    self.last_error = None;
                    self.receiver = None;
                    updated = true;
                    break;
                }
                Ok(LoadEvent::Failed { message }) => {
                    if self.snapshot.is_some() {
                        warn!("Refresh failed, keeping previous snapshot: {}", message);
                    }
                    self.last_error = Some(message);
                    self.receiver = None;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.last_error = Some("Load worker disconnected".to_string());
                    self.receiver = None;
                    break;
                }
            }
        }
        updated
    }

    pub fn service(&self) -> &Arc<DataService> {
        &self.service
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn is_loading(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn blocking_error(&self) -> Option<&str> {
        match self.snapshot {
            Some(_) => None,
            None => self.last_error.as_deref(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn time_until_refresh(&self, now: Instant) -> Option<Duration> {
        self.poller.time_until_due(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WinnersByCategory;
    use crate::services::config_loader::{BrewOffConfig, SourcesConfig};
    use crate::services::result_cache::MemoryStore;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(config: BrewOffConfig) -> DataSession {
        DataSession::new(Arc::new(DataService::with_store(
            config,
            Box::new(MemoryStore::default()),
        )))
    }

    fn settle(session: &mut DataSession) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_loading() && Instant::now() < deadline {
            session.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn failure_without_snapshot_is_blocking() {
        let mut session = session(BrewOffConfig::default());
        session.start(Instant::now());
        assert!(session.is_loading());
        settle(&mut session);

        assert!(!session.is_loading());
        let message = session.blocking_error().unwrap();
        assert!(message.contains("registrants_url"));
    }

    #[test]
    fn failure_with_snapshot_keeps_it_on_screen() {
        let mut session = session(BrewOffConfig::default());
        session.snapshot = Some(Snapshot {
            entries: Vec::new(),
            winners: WinnersByCategory::default(),
            generated_at: Utc::now(),
        });
        session.request(true);
        settle(&mut session);

        assert!(session.snapshot().is_some());
        assert!(session.blocking_error().is_none());
        assert!(session.last_error().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_within_max_age_reads_the_persisted_snapshot() {
        let server = MockServer::start().await;
        for (route, body) in [
            ("/registrants", "EntryID\tBeer Name\tBrewer's Name\nB-001\tHelles\tAnna\n"),
            (
                "/leaderboard",
                "EntryID\tBeer\tAvg Drinkability\tAvg Flavor\tAvg Color\tAvg Label\tAvg Overall\tVotes\tTotal\n\
                 B-001\tHelles\t4\t4\t4\t4\t4\t3\t20\n",
            ),
            ("/winners", "Category\tPlace\tEntryID\nOverall\t1\tB-001\n"),
        ] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .expect(1)
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let mut config = BrewOffConfig::default();
        config.sources = SourcesConfig {
            registrants_url: Some(format!("{}/registrants", server.uri())),
            leaderboard_url: Some(format!("{}/leaderboard", server.uri())),
            winners_url: Some(format!("{}/winners", server.uri())),
            comments_url: None,
        };
        config.cache.directory = Some(dir.path().to_path_buf());

        let (first, restarted) = tokio::task::spawn_blocking(move || {
            let run = |config: BrewOffConfig| {
                let mut session = DataSession::new(Arc::new(DataService::new(config)));
                session.start(Instant::now());
                settle(&mut session);
                session.stop();
                (session.snapshot().cloned(), session.from_cache())
            };
            (run(config.clone()), run(config))
        })
        .await
        .unwrap();

        assert!(first.0.is_some());
        assert!(!first.1);
        assert!(restarted.1);
        assert_eq!(restarted.0, first.0);
    }

    #[test]
    fn poll_is_armed_on_start_and_disarmed_on_stop() {
        let now = Instant::now();
        let mut session = session(BrewOffConfig::default());
        assert_eq!(session.time_until_refresh(now), None);
        session.start(now);
        assert_eq!(session.time_until_refresh(now), Some(Duration::from_secs(60)));
        session.stop();
        assert!(!session.is_loading());
        assert_eq!(session.time_until_refresh(now), None);
    }
}
