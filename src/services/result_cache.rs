use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<T> {
    value: T,
    saved_at: DateTime<Utc>,
}

pub struct ResultCache<T> {
    memory: HashMap<String, CacheEntry<T>>,
    store: Box<dyn KeyValueStore>,
}

impl<T> ResultCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            memory: HashMap::new(),
            store,
        }
    }

    pub fn get(&mut self, key: &str, max_age: Duration) -> Option<T> {
        self.get_at(key, max_age, Utc::now())
    }

    pub fn get_at(&mut self, key: &str, max_age: Duration, now: DateTime<Utc>) -> Option<T> {
        if let Some(entry) = self.memory.get(key)
            && is_fresh(entry.saved_at, max_age, now)
        {
            debug!("Cache hit (memory) for {}", key);
            return Some(entry.value.clone());
        }

        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("Cache read for {} failed: {}", key, err);
                return None;
            }
        };
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Discarding unreadable cache record {}: {}", key, err);
                return None;
            }
        };
        if !is_fresh(entry.saved_at, max_age, now) {
            debug!("Cache record {} is stale (saved {})", key, entry.saved_at);
            return None;
        }

        debug!("Cache hit (persistent) for {}", key);
        let value = entry.value.clone();
        self.memory.insert(key.to_string(), entry);
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: T) {
        self.set_at(key, value, Utc::now());
    }

    /// Writes both tiers. Last write wins; there is no version check.
    pub fn set_at(&mut self, key: &str, value: T, now: DateTime<Utc>) {
        let entry = CacheEntry {
            value,
            saved_at: now,
        };
        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(err) = self.store.set(key, &raw) {
                    warn!("Cache write for {} failed, keeping memory copy: {}", key, err);
                }
            }
            Err(err) => warn!("Cache record {} not serializable: {}", key, err),
        }
        self.memory.insert(key.to_string(), entry);
    }
}

fn is_fresh(saved_at: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return true;
    };
    now.signed_duration_since(saved_at) <= max_age
}
