// src/store/mod.rs

//! TTL-capable key-value storage for pending intents and daily counters
//!
//! The attribution service only ever talks to [`IntentRecordStore`], which in
//! turn depends on the [`KeyValueStore`] trait. Backends are interchangeable:
//! an in-process map for tests and single-node runs, SQLite for persistence.

pub mod intent_store;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::Clock;

pub use intent_store::{CounterKind, IntentRecord, IntentRecordStore, INTENT_TTL_SECONDS};
pub use memory::InMemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

/// Operations the attribution core needs from its backing store.
///
/// Every call is atomic for the single key it touches. Expired keys are
/// reported as absent, never as an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Overwrites `key`; the key disappears after `ttl_seconds` (never, if `None`).
    async fn set(&self, key: &str, value: String, ttl_seconds: Option<u64>) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Removes `key`. Returns whether anything was removed; absent keys are fine.
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;

    /// Live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Increments an integer counter, creating it at zero first. Returns the new value.
    async fn incr(&self, key: &str) -> anyhow::Result<i64>;

    /// Drops every expired entry not yet evicted by a read. Returns how many went.
    async fn purge_expired(&self) -> anyhow::Result<usize>;
}

/// Which backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite { path: std::path::PathBuf },
}

impl StoreBackend {
    pub fn parse(kind: &str, path: &str) -> anyhow::Result<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite { path: path.into() }),
            other => Err(anyhow::anyhow!(
                "Unknown store backend '{}'. Expected 'memory' or 'sqlite'",
                other
            )),
        }
    }

    pub fn open(&self, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<dyn KeyValueStore>> {
        match self {
            StoreBackend::Memory => Ok(Arc::new(InMemoryKeyValueStore::with_clock(clock))),
            StoreBackend::Sqlite { path } => {
                Ok(Arc::new(SqliteKeyValueStore::open(path, clock)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!(StoreBackend::parse("memory", "").unwrap(), StoreBackend::Memory);
        assert_eq!(
            StoreBackend::parse("SQLite", "/tmp/relay.db").unwrap(),
            StoreBackend::Sqlite { path: "/tmp/relay.db".into() }
        );
        assert!(StoreBackend::parse("redis", "").is_err());
    }
}
