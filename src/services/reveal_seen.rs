use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::services::result_cache::KeyValueStore;

pub const REVEAL_SEEN_KEY: &str = "brew-off-reveal-seen";

#[derive(Debug, Serialize, Deserialize)]
struct SeenRecord {
    seen: bool,
    expires_at: DateTime<Utc>,
}

pub struct RevealSeenFlag {
    store: Box<dyn KeyValueStore>,
    retention: Duration,
}

impl RevealSeenFlag {
    pub fn new(store: Box<dyn KeyValueStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention: Duration::days(retention_days.max(0)),
        }
    }

    pub fn is_seen(&self) -> bool {
        self.is_seen_at(Utc::now())
    }

    pub fn is_seen_at(&self, now: DateTime<Utc>) -> bool {
        let raw = match self.store.get(REVEAL_SEEN_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(err) => {
                warn!("Reveal-seen flag unreadable: {}", err);
                return false;
            }
        };
        match serde_json::from_str::<SeenRecord>(&raw) {
            Ok(record) => record.seen && record.expires_at > now,
            Err(err) => {
                debug!("Ignoring malformed reveal-seen record: {}", err);
                false
            }
        }
    }

    pub fn mark_seen(&self) {
        self.mark_seen_at(Utc::now());
    }

    pub fn mark_seen_at(&self, now: DateTime<Utc>) {
        if self.is_seen_at(now) {
            return;
        }
        let record = SeenRecord {
            seen: true,
            expires_at: now + self.retention,
        };
        let written = serde_json::to_string(&record)
            .map_err(crate::error::StoreError::from)
            .and_then(|raw| self.store.set(REVEAL_SEEN_KEY, &raw));
        match written {
            Ok(()) => info!("Reveal marked as seen until {}", record.expires_at),
            Err(err) => warn!("Could not persist reveal-seen flag: {}", err),
        }
    }

    pub fn clear(&self) {
        match self.store.remove(REVEAL_SEEN_KEY) {
            Ok(()) => info!("Reveal-seen flag cleared"),
            Err(err) => warn!("Could not clear reveal-seen flag: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::result_cache::{FileStore, MemoryStore};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 30, 21, 0, 0).unwrap()
    }

    #[test]
    fn unseen_until_marked() {
        let flag = RevealSeenFlag::new(Box::new(MemoryStore::default()), 365);
        assert!(!flag.is_seen_at(t0()));
        flag.mark_seen_at(t0());
        assert!(flag.is_seen_at(t0() + Duration::days(364)));
    }

    #[test]
    fn expires_after_retention() {
        let flag = RevealSeenFlag::new(Box::new(MemoryStore::default()), 365);
        flag.mark_seen_at(t0());
        assert!(!flag.is_seen_at(t0() + Duration::days(366)));
    }

    #[test]
    fn marking_twice_keeps_first_expiry() {
        let flag = RevealSeenFlag::new(Box::new(MemoryStore::default()), 10);
        flag.mark_seen_at(t0());
        flag.mark_seen_at(t0() + Duration::days(5));
        assert!(!flag.is_seen_at(t0() + Duration::days(11)));
    }

    #[test]
    fn clear_resets_and_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        RevealSeenFlag::new(Box::new(FileStore::new(dir.path())), 365).mark_seen_at(t0());

        let reopened = RevealSeenFlag::new(Box::new(FileStore::new(dir.path())), 365);
        assert!(reopened.is_seen_at(t0()));
        reopened.clear();
        assert!(!reopened.is_seen_at(t0()));
    }

    #[test]
    fn malformed_record_reads_as_unseen() {
        let store = MemoryStore::default();
        store.set(REVEAL_SEEN_KEY, "true").unwrap();
        let flag = RevealSeenFlag::new(Box::new(store), 365);
        assert!(!flag.is_seen_at(t0()));
    }
}
