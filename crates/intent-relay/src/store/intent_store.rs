//! Intent record persistence on top of a [`KeyValueStore`]
//!
//! Key layout:
//! - `intentrelay:<fingerprint>` holds the serialized [`IntentRecord`].
//! - `intentrelay-net:<bucket>/<created_at>/<fingerprint>` points at the same
//!   record from its network bucket so near-miss queries can find candidates.
//!   `/` never occurs in an address, and `created_at` is zero-padded so the
//!   keys of one bucket sort by click time.
//! - `stats:<success|error>:<YYYY-MM-DD>` are the daily counters.

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::KeyValueStore;
use crate::fingerprint::Fingerprint;
use crate::matcher::network_bucket;
use crate::signals::CapturedSignals;

/// Lifetime of a pending intent, from its creation.
pub const INTENT_TTL_SECONDS: u64 = 24 * 60 * 60;

const RECORD_PREFIX: &str = "intentrelay:";
const NETWORK_INDEX_PREFIX: &str = "intentrelay-net:";
const HEALTH_PREFIX: &str = "health:";
const HEALTH_TTL_SECONDS: u64 = 10;

/// Most records scored for one near-miss query; the newest clicks win.
pub const MAX_CANDIDATES: usize = 32;

/// Click-time payload waiting for a matching post-install query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRecord {
    pub link_id: String,
    pub content: String,
    pub campaign: String,
    pub source: String,
    pub fingerprint: Fingerprint,
    pub signals: CapturedSignals,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub created_at: i64,
}

impl IntentRecord {
    /// Bucket this record is indexed under.
    pub fn network_bucket(&self) -> String {
        bucket_for(self.signals.network_address.as_deref())
    }

    /// True once more than `ttl_seconds` have passed since creation.
    pub fn is_stale(&self, now_millis: i64, ttl_seconds: u64) -> bool {
        now_millis.saturating_sub(self.created_at) > (ttl_seconds as i64).saturating_mul(1000)
    }
}

/// Bucket for an optional network address; absent addresses share one bucket.
pub fn bucket_for(address: Option<&str>) -> String {
    match address.filter(|a| !a.is_empty()) {
        Some(address) => network_bucket(address),
        None => "unknown".to_string(),
    }
}

/// The two daily counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Success,
    Error,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Success => "success",
            CounterKind::Error => "error",
        }
    }
}

#[derive(Clone)]
pub struct IntentRecordStore {
    kv: Arc<dyn KeyValueStore>,
}

impl IntentRecordStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    fn record_key(fingerprint: &Fingerprint) -> String {
        format!("{}{}", RECORD_PREFIX, fingerprint)
    }

    fn bucket_prefix(bucket: &str) -> String {
        format!("{}{}/", NETWORK_INDEX_PREFIX, bucket)
    }

    fn index_key(bucket: &str, created_at: i64, fingerprint: &Fingerprint) -> String {
        format!(
            "{}{:013}/{}",
            Self::bucket_prefix(bucket),
            created_at.max(0),
            fingerprint
        )
    }

    /// Splits the part after the bucket prefix into click time and fingerprint.
    fn parse_index_suffix(suffix: &str) -> Option<(i64, Fingerprint)> {
        let (created_at, fingerprint) = suffix.split_once('/')?;
        if created_at.is_empty() || !created_at.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((created_at.parse().ok()?, Fingerprint::parse(fingerprint)?))
    }

    fn counter_key(kind: CounterKind, day: NaiveDate) -> String {
        format!("stats:{}:{}", kind.as_str(), day.format("%Y-%m-%d"))
    }

    /// Stores `record` under `fingerprint`, replacing any previous record.
    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        record: &IntentRecord,
        ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(record).context("Failed to serialize intent record")?;
        self.kv
            .set(&Self::record_key(fingerprint), payload, Some(ttl_seconds))
            .await?;
        self.kv
            .set(
                &Self::index_key(&record.network_bucket(), record.created_at, fingerprint),
                fingerprint.to_string(),
                Some(ttl_seconds),
            )
            .await?;
        debug!("Stored intent {} under {}", record.link_id, fingerprint.short());
        Ok(())
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> anyhow::Result<Option<IntentRecord>> {
        let key = Self::record_key(fingerprint);
        match self.kv.get(&key).await? {
            Some(payload) => {
                let record = serde_json::from_str(&payload)
                    .with_context(|| format!("Malformed intent record at {}", key))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Removes the record stored under `fingerprint`. Idempotent.
    pub async fn delete(&self, fingerprint: &Fingerprint) -> anyhow::Result<()> {
        self.kv.delete(&Self::record_key(fingerprint)).await?;
        Ok(())
    }

    /// Removes `record` and its network index entry.
    pub async fn remove(&self, record: &IntentRecord) -> anyhow::Result<()> {
        self.delete(&record.fingerprint).await?;
        self.kv
            .delete(&Self::index_key(
                &record.network_bucket(),
                record.created_at,
                &record.fingerprint,
            ))
            .await?;
        Ok(())
    }

    /// Newest records indexed under `bucket`, at most [`MAX_CANDIDATES`].
    ///
    /// Keys that do not parse as this bucket's entries are skipped untouched.
    /// Entries whose record is gone or was overwritten by a later click are dropped.
    pub async fn candidates(&self, bucket: &str) -> anyhow::Result<Vec<IntentRecord>> {
        let prefix = Self::bucket_prefix(bucket);
        let mut entries: Vec<(String, i64, Fingerprint)> = self
            .kv
            .keys(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| {
                let parsed = key
                    .strip_prefix(prefix.as_str())
                    .and_then(Self::parse_index_suffix);
                match parsed {
                    Some((created_at, fingerprint)) => Some((key, created_at, fingerprint)),
                    None => {
                        debug!("Skipping foreign index key {}", key);
                        None
                    }
                }
            })
            .collect();

        entries.sort_by(|a, b| b.1.cmp(&a.1));
        if entries.len() > MAX_CANDIDATES {
            warn!(
                "Bucket {} holds {} pending intents, scoring the newest {}",
                bucket,
                entries.len(),
                MAX_CANDIDATES
            );
            entries.truncate(MAX_CANDIDATES);
        }

        let lookups = entries
            .iter()
            .map(|(_, _, fingerprint)| self.get(fingerprint));
        let results = join_all(lookups).await;

        let mut records = Vec::new();
        for ((index_key, created_at, _), result) in entries.iter().zip(results) {
            match result? {
                Some(record) if record.created_at.max(0) == *created_at => records.push(record),
                _ => {
                    if let Err(e) = self.kv.delete(index_key).await {
                        warn!("Failed to drop stale index entry {}: {}", index_key, e);
                    }
                }
            }
        }
        Ok(records)
    }

    /// Number of records currently pending.
    pub async fn pending_count(&self) -> anyhow::Result<usize> {
        Ok(self.kv.keys(RECORD_PREFIX).await?.len())
    }

    pub async fn increment_counter(&self, kind: CounterKind, day: NaiveDate) -> anyhow::Result<i64> {
        self.kv.incr(&Self::counter_key(kind, day)).await
    }

    pub async fn counter(&self, kind: CounterKind, day: NaiveDate) -> anyhow::Result<i64> {
        let key = Self::counter_key(kind, day);
        match self.kv.get(&key).await? {
            Some(value) => value
                .parse()
                .with_context(|| format!("Counter {} is not an integer", key)),
            None => Ok(0),
        }
    }

    /// Round-trips a throwaway key to prove the store is reachable.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let key = format!("{}{}", HEALTH_PREFIX, uuid::Uuid::new_v4());
        self.kv
            .set(&key, "ok".to_string(), Some(HEALTH_TTL_SECONDS))
            .await?;
        let value = self.kv.get(&key).await?;
        self.kv.delete(&key).await?;
        if value.as_deref() != Some("ok") {
            return Err(anyhow::anyhow!("Store round-trip returned {:?}", value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fingerprint;
    use crate::signals::{ObservationContext, SignalTuple};
    use crate::store::InMemoryKeyValueStore;

    const START: i64 = 1_700_000_000_000;

    fn setup() -> (IntentRecordStore, Arc<InMemoryKeyValueStore>, ManualClock) {
        let clock = ManualClock::new(START);
        let kv = Arc::new(InMemoryKeyValueStore::with_clock(Arc::new(clock.clone())));
        (IntentRecordStore::new(kv.clone()), kv, clock)
    }

    fn record(ip: &str) -> IntentRecord {
        let signals = SignalTuple {
            network_address: Some(ip.to_string()),
            platform_name: Some("iOS".to_string()),
            platform_version: Some("17.1".to_string()),
            ..Default::default()
        };
        IntentRecord {
            link_id: "abc".to_string(),
            content: "promo42".to_string(),
            campaign: "summer".to_string(),
            source: "newsletter".to_string(),
            fingerprint: fingerprint::build(&signals, ObservationContext::Click),
            signals: signals.capture(),
            created_at: START,
        }
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let (store, _, _) = setup();
        let rec = record("203.0.113.10");
        store.put(&rec.fingerprint, &rec, INTENT_TTL_SECONDS).await.unwrap();
        assert_eq!(store.get(&rec.fingerprint).await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_record_absent_after_ttl() {
        let (store, _, clock) = setup();
        let rec = record("203.0.113.10");
        store.put(&rec.fingerprint, &rec, INTENT_TTL_SECONDS).await.unwrap();
        clock.advance_secs(INTENT_TTL_SECONDS as i64);
        assert_eq!(store.get(&rec.fingerprint).await.unwrap(), None);
        assert!(store.candidates("203.0.113").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _, _) = setup();
        let rec = record("203.0.113.10");
        store.put(&rec.fingerprint, &rec, INTENT_TTL_SECONDS).await.unwrap();
        store.delete(&rec.fingerprint).await.unwrap();
        store.delete(&rec.fingerprint).await.unwrap();
        assert_eq!(store.get(&rec.fingerprint).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_candidates_by_bucket() {
        let (store, _, _) = setup();
        let near = record("203.0.113.10");
        let far = record("198.51.100.7");
        for rec in [&near, &far] {
            store.put(&rec.fingerprint, rec, INTENT_TTL_SECONDS).await.unwrap();
        }
        assert_eq!(store.candidates("203.0.113").await.unwrap(), vec![near.clone()]);
        assert_eq!(store.pending_count().await.unwrap(), 2);

        store.remove(&near).await.unwrap();
        assert!(store.candidates("203.0.113").await.unwrap().is_empty());
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dangling_index_entry_is_dropped() {
        let (store, kv, _) = setup();
        let rec = record("203.0.113.10");
        store.put(&rec.fingerprint, &rec, INTENT_TTL_SECONDS).await.unwrap();
        store.delete(&rec.fingerprint).await.unwrap();
        assert_eq!(kv.raw_len(), 1);
        assert!(store.candidates("203.0.113").await.unwrap().is_empty());
        assert_eq!(kv.raw_len(), 0);
    }

    #[tokio::test]
    async fn test_ipv6_bucket_does_not_claim_longer_address() {
        let (store, kv, _) = setup();
        let longer = record("2001:db8::1:5");
        store.put(&longer.fingerprint, &longer, INTENT_TTL_SECONDS).await.unwrap();

        assert!(store.candidates("2001:db8::1").await.unwrap().is_empty());
        assert_eq!(kv.raw_len(), 2);
        assert_eq!(
            store.candidates(&longer.network_bucket()).await.unwrap(),
            vec![longer]
        );
    }

    #[tokio::test]
    async fn test_foreign_keys_under_prefix_are_left_alone() {
        let (store, kv, _) = setup();
        kv.set("intentrelay-net:10.0.0/oops", "x".to_string(), None).await.unwrap();
        kv.set("intentrelay-net:10.0.0/123/not-a-digest", "x".to_string(), None)
            .await
            .unwrap();
        assert!(store.candidates("10.0.0").await.unwrap().is_empty());
        assert_eq!(kv.raw_len(), 2);
    }

    #[tokio::test]
    async fn test_candidates_capped_to_newest() {
        let (store, _, _) = setup();
        let total = MAX_CANDIDATES + 8;
        for i in 0..total {
            let mut rec = record(&format!("10.0.0.{}", i));
            rec.created_at = START + i as i64;
            store.put(&rec.fingerprint, &rec, INTENT_TTL_SECONDS).await.unwrap();
        }

        let found = store.candidates("10.0.0").await.unwrap();
        assert_eq!(found.len(), MAX_CANDIDATES);
        let oldest_kept = START + (total - MAX_CANDIDATES) as i64;
        assert!(found.iter().all(|r| r.created_at >= oldest_kept));
        assert_eq!(found[0].created_at, START + total as i64 - 1);
        assert_eq!(store.pending_count().await.unwrap(), total);
    }

    #[tokio::test]
    async fn test_overwritten_record_listed_once() {
        let (store, kv, clock) = setup();
        let first = record("203.0.113.10");
        store.put(&first.fingerprint, &first, INTENT_TTL_SECONDS).await.unwrap();
        clock.advance_secs(30);
        let mut second = first.clone();
        second.link_id = "again".to_string();
        second.created_at = START + 30_000;
        store.put(&second.fingerprint, &second, INTENT_TTL_SECONDS).await.unwrap();

        assert_eq!(store.candidates("203.0.113").await.unwrap(), vec![second]);
        // Record plus the surviving index entry.
        assert_eq!(kv.raw_len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_record_is_an_error() {
        let (store, kv, _) = setup();
        let fp = Fingerprint::from_hex("deadbeef");
        kv.set("intentrelay:deadbeef", "{not json".to_string(), None).await.unwrap();
        assert!(store.get(&fp).await.is_err());
    }

    #[tokio::test]
    async fn test_counters_are_per_day() {
        let (store, _, _) = setup();
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        store.increment_counter(CounterKind::Success, today).await.unwrap();
        store.increment_counter(CounterKind::Success, today).await.unwrap();
        store.increment_counter(CounterKind::Error, today).await.unwrap();
        assert_eq!(store.counter(CounterKind::Success, today).await.unwrap(), 2);
        assert_eq!(store.counter(CounterKind::Error, today).await.unwrap(), 1);
        assert_eq!(store.counter(CounterKind::Success, tomorrow).await.unwrap(), 0);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_health_check_leaves_nothing_behind() {
        let (store, kv, _) = setup();
        store.health_check().await.unwrap();
        assert_eq!(kv.raw_len(), 0);
    }

    #[test]
    fn test_staleness_boundary() {
        let rec = record("203.0.113.10");
        let ttl_ms = (INTENT_TTL_SECONDS as i64) * 1000;
        assert!(!rec.is_stale(START + ttl_ms, INTENT_TTL_SECONDS));
        assert!(rec.is_stale(START + ttl_ms + 1, INTENT_TTL_SECONDS));
    }

    #[test]
    fn test_corrupt_timestamp_is_stale_not_a_panic() {
        let mut rec = record("203.0.113.10");
        rec.created_at = i64::MIN;
        assert!(rec.is_stale(START, INTENT_TTL_SECONDS));
        rec.created_at = i64::MAX;
        assert!(!rec.is_stale(START, INTENT_TTL_SECONDS));
    }

    #[test]
    fn test_bucket_for_missing_address() {
        assert_eq!(bucket_for(None), "unknown");
        assert_eq!(bucket_for(Some("")), "unknown");
        assert_eq!(bucket_for(Some("10.1.2.3")), "10.1.2");
    }
}
