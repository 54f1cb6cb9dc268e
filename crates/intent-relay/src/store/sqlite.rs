//! SQLite-backed key-value store
//!
//! SQLite has no native key expiry: each row carries an `expires_at_ms`
//! column, reads treat expired rows as absent and delete them, and
//! the periodic `purge_expired` sweep removes the rest.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::KeyValueStore;
use crate::clock::Clock;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    expires_at_ms INTEGER
);
CREATE INDEX IF NOT EXISTS idx_kv_entries_expiry ON kv_entries(expires_at_ms);
";

pub struct SqliteKeyValueStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    clock: Arc<dyn Clock>,
}

impl SqliteKeyValueStore {
    pub fn open(db_path: &Path, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        info!("Opening intent store at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;
        {
            let conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            conn.execute_batch(SCHEMA_SQL)?;
        }
        Ok(Self {
            pool: Arc::new(pool),
            clock,
        })
    }

    /// Single-connection in-memory database. Every pooled connection to
    /// `:memory:` would be a separate database, so the pool is capped at one.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch(SCHEMA_SQL)?;
        }
        Ok(Self {
            pool: Arc::new(pool),
            clock,
        })
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }
}

/// Deletes `key` only while its row is still expired at `now`, so a write
/// that landed after the expired read survives.
fn delete_if_expired(conn: &rusqlite::Connection, key: &str, now: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM kv_entries WHERE key = ?1 AND expires_at_ms IS NOT NULL AND expires_at_ms <= ?2",
        params![key, now],
    )
}

fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn set(&self, key: &str, value: String, ttl_seconds: Option<u64>) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let expires_at = ttl_seconds.map(|ttl| self.clock.now_millis() + (ttl as i64) * 1000);
        conn.execute(
            "INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at_ms = excluded.expires_at_ms",
            params![key, value, expires_at],
        )
        .with_context(|| format!("Failed to write key {}", key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.get_conn()?;
        let now = self.clock.now_millis();
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at_ms FROM kv_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((_, Some(expires_at))) if expires_at <= now => {
                delete_if_expired(&conn, key, now)?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let removed = conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_entries
             WHERE key LIKE ?1 ESCAPE '\\'
               AND (expires_at_ms IS NULL OR expires_at_ms > ?2)",
        )?;
        let mut rows = stmt.query(params![escape_like(prefix), self.clock.now_millis()])?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next()? {
            keys.push(row.get(0)?);
        }
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> anyhow::Result<i64> {
        let mut conn = self.get_conn()?;
        let now = self.clock.now_millis();
        let tx = conn.transaction()?;
        let current: Option<(String, Option<i64>)> = tx
            .query_row(
                "SELECT value, expires_at_ms FROM kv_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let base = match current {
            Some((_, Some(expires_at))) if expires_at <= now => 0,
            Some((value, _)) => value
                .parse::<i64>()
                .map_err(|_| anyhow::anyhow!("Value at '{}' is not an integer", key))?,
            None => 0,
        };
        let next = base + 1;
        tx.execute(
            "INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?1, ?2, NULL)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at_ms = NULL",
            params![key, next.to_string()],
        )?;
        tx.commit()?;
        Ok(next)
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM kv_entries WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
            [self.clock.now_millis()],
        )?;
        if removed > 0 {
            debug!("Purged {} expired entries", removed);
        }
        Ok(removed)
    }
}
