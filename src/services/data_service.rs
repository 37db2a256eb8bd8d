use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::{LoadError, LoadResult};
use crate::models::{Comment, Entry, Snapshot, Table};
use crate::services::config_loader::{BrewOffConfig, CacheConfig};
use crate::services::entity_reconciler::{
    parse_judge_comments, parse_leaderboard, parse_registrants, reconcile,
};
use crate::services::result_cache::{FileStore, KeyValueStore, MemoryStore, ResultCache};
use crate::services::tabular_fetcher::TabularFetcher;
use crate::services::winners_resolver::resolve_winners;

pub enum LoadEvent {
    Started {
        force: bool,
    },
    Finished {
        snapshot: Box<Snapshot>,
        from_cache: bool,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub snapshot: Snapshot,
    pub from_cache: bool,
}

pub fn open_store(cache: &CacheConfig) -> Box<dyn KeyValueStore> {
    match cache.resolved_directory() {
        Some(dir) => {
            let store = FileStore::new(dir);
            info!("Persistent store at {}", store.root().display());
            Box::new(store)
        }
        None => {
            warn!("No cache directory available, persistence disabled for this session");
            Box::new(MemoryStore::default())
        }
    }
}

pub struct DataService {
    config: BrewOffConfig,
    fetcher: TabularFetcher,
    cache: Mutex<ResultCache<Snapshot>>,
}

impl DataService {
    pub fn new(config: BrewOffConfig) -> Self {
        let store = open_store(&config.cache);
        Self::with_store(config, store)
    }

    pub fn with_store(config: BrewOffConfig, store: Box<dyn KeyValueStore>) -> Self {
        Self {
            config,
            fetcher: TabularFetcher::new(),
            cache: Mutex::new(ResultCache::new(store)),
        }
    }

    pub fn config(&self) -> &BrewOffConfig {
        &self.config
    }

    pub async fn load(&self, force: bool) -> LoadResult<LoadOutcome> {
        if !force && let Some(snapshot) = self.cached() {
            info!("Serving snapshot from cache ({})", snapshot.generated_at);
            return Ok(LoadOutcome {
                snapshot,
                from_cache: true,
            });
        }

        let sources = &self.config.sources;
        let registrants_url = sources
            .registrants_url
            .as_deref()
            .ok_or(LoadError::MissingSource("registrants_url"))?;
        let leaderboard_url = sources
            .leaderboard_url
            .as_deref()
            .ok_or(LoadError::MissingSource("leaderboard_url"))?;
        let winners_url = sources
            .winners_url
            .as_deref()
            .ok_or(LoadError::MissingSource("winners_url"))?;

        let comments = async {
            let Some(url) = sources.comments_url.as_deref() else {
                return Ok(None);
            };
            match self.fetcher.fetch_table(url).await {
                Ok(table) => Ok(Some(table)),
                Err(err) => {
                    warn!("Judge comments unavailable, continuing without: {}", err);
                    Ok(None)
                }
            }
        };

        let (registrants, leaderboard, winners, comments) = tokio::try_join!(
            self.fetcher.fetch_table(registrants_url),
            self.fetcher.fetch_table(leaderboard_url),
            self.fetcher.fetch_table(winners_url),
            comments,
        )?;

        let snapshot = build_snapshot(
            &registrants,
            &leaderboard,
            &winners,
            comments.as_ref(),
            self.config.score_scale,
            Utc::now(),
        );
        self.store(snapshot.clone());
        Ok(LoadOutcome {
            snapshot,
            from_cache: false,
        })
    }

    /// Runs `load` on a worker thread. Dropping the receiver discards the
    /// result; the requests themselves are never aborted.
    pub fn spawn_load(self: &Arc<Self>, force: bool) -> Receiver<LoadEvent> {
        let (tx, rx) = mpsc::channel::<LoadEvent>();
        let service = Arc::clone(self);

        thread::spawn(move || {
            let _ = tx.send(LoadEvent::Started { force });

            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    let _ = tx.send(LoadEvent::Failed {
                        message: LoadError::Runtime(err.to_string()).to_string(),
                    });
                    return;
                }
            };

            let event = match runtime.block_on(service.load(force)) {
                Ok(outcome) => LoadEvent::Finished {
                    snapshot: Box::new(outcome.snapshot),
                    from_cache: outcome.from_cache,
                },
                Err(err) => {
                    error!("Data load failed: {}", err);
                    LoadEvent::Failed {
                        message: err.to_string(),
                    }
                }
            };
            if tx.send(event).is_err() {
                info!("Load result arrived after its consumer went away, discarded");
            }
        });

        rx
    }

    fn cached(&self) -> Option<Snapshot> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.get(&self.config.cache.key, self.config.cache.max_age())
    }

    fn store(&self, snapshot: Snapshot) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.set(&self.config.cache.key, snapshot);
    }
}

pub fn build_snapshot(
    registrants: &Table,
    leaderboard: &Table,
    winners: &Table,
    comments: Option<&Table>,
    score_scale: f64,
    generated_at: DateTime<Utc>,
) -> Snapshot {
    let registrants = parse_registrants(registrants);
    let leaderboard = parse_leaderboard(leaderboard, score_scale);
    let judge_comments: HashMap<String, Vec<Comment>> =
        comments.map(parse_judge_comments).unwrap_or_default();

    let by_code = reconcile(&registrants, &leaderboard, &judge_comments);
    let winners = resolve_winners(winners, &by_code);

    let mut entries: Vec<Entry> = by_code.into_values().collect();
    entries.sort_by(Entry::leaderboard_cmp);

    Snapshot {
        entries,
        winners,
        generated_at,
    }
}

pub struct RefreshPoller {
    interval: Duration,
    next_due: Option<Instant>,
}

impl RefreshPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.interval.is_zero() {
            self.next_due = None;
            return;
        }
        self.next_due = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }

    pub fn due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}
