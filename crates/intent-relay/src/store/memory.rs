use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::KeyValueStore;
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map_or(true, |at| now_ms < at)
    }
}

/// Process-local store with lazy expiry.
#[derive(Clone)]
pub struct InMemoryKeyValueStore {
    entries: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of entries held, including expired ones not yet evicted.
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set(&self, key: &str, value: String, ttl_seconds: Option<u64>) -> anyhow::Result<()> {
        let expires_at_ms = ttl_seconds.map(|ttl| self.clock.now_millis() + (ttl as i64) * 1000);
        self.entries.insert(key.to_string(), Entry { value, expires_at_ms });
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = self.clock.now_millis();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live(now))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn incr(&self, key: &str) -> anyhow::Result<i64> {
        let now = self.clock.now_millis();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at_ms: None,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: "0".to_string(),
                expires_at_ms: None,
            };
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| anyhow::anyhow!("Value at '{}' is not an integer", key))?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}
