//! Attribution service
//!
//! Click side: fingerprint the browser, store the intent for 24 hours.
//! Query side: fingerprint the installed app, find the stored intent, score
//! it against the app's signals, and hand it out at most once.
//!
//! Per click, the lifecycle is `PENDING` until a query matches (`MATCHED`,
//! record consumed), or the TTL runs out (`EXPIRED`, record purged). A query
//! that scores below the threshold reports a mismatch and leaves the record
//! in place for another attempt.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{AttributionError, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::matcher;
use crate::metrics;
use crate::signals::{present, AppInfo, CapturedSignals, ObservationContext, SignalTuple};
use crate::store::intent_store::bucket_for;
use crate::store::{CounterKind, IntentRecord, IntentRecordStore, INTENT_TTL_SECONDS};

pub const DEFAULT_CONTENT: &str = "default";
pub const DEFAULT_CAMPAIGN: &str = "direct";
pub const DEFAULT_SOURCE: &str = "unknown";

/// A link click as seen by the redirect layer.
#[derive(Debug, Clone, Default)]
pub struct ClickRequest {
    pub link_id: String,
    pub content: Option<String>,
    pub campaign: Option<String>,
    pub source: Option<String>,
    pub signals: SignalTuple,
    /// Platform classification made by the caller (iOS or Android).
    pub mobile: bool,
}

/// Content, campaign and source with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentParams {
    pub content: String,
    pub campaign: String,
    pub source: String,
}

impl IntentParams {
    pub fn with_defaults(
        content: Option<String>,
        campaign: Option<String>,
        source: Option<String>,
    ) -> Self {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }
        Self {
            content: or_default(content, DEFAULT_CONTENT),
            campaign: or_default(campaign, DEFAULT_CAMPAIGN),
            source: or_default(source, DEFAULT_SOURCE),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickOutcome {
    pub mobile: bool,
    pub record_written: bool,
    pub intent: IntentParams,
    pub fingerprint: Option<Fingerprint>,
}

/// Intent handed to the app after a successful match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedIntent {
    pub link_id: String,
    pub content: String,
    pub campaign: String,
    pub source: String,
    pub score: f64,
    /// Click time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Outcome of a post-install query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(MatchedIntent),
    NotFound,
    Expired,
    Mismatch { score: f64 },
}

impl Resolution {
    pub fn found(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Resolution::Matched(_) => None,
            Resolution::NotFound => Some("No matching fingerprint found"),
            Resolution::Expired => Some("Data expired"),
            Resolution::Mismatch { .. } => Some("Device mismatch"),
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Resolution::Matched(intent) => Some(intent.score),
            Resolution::Mismatch { score } => Some(*score),
            Resolution::NotFound | Resolution::Expired => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Matched(_) => "matched",
            Resolution::NotFound => "not_found",
            Resolution::Expired => "expired",
            Resolution::Mismatch { .. } => "mismatch",
        }
    }
}

#[derive(Clone)]
pub struct AttributionService {
    store: IntentRecordStore,
    clock: Arc<dyn Clock>,
}

impl AttributionService {
    pub fn new(store: IntentRecordStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: IntentRecordStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &IntentRecordStore {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Records the intent behind a click. Only mobile clicks touch the store.
    pub async fn record_click(&self, click: ClickRequest) -> Result<ClickOutcome> {
        if click.link_id.trim().is_empty() {
            return Err(AttributionError::Validation("linkId is required".to_string()));
        }

        let intent = IntentParams::with_defaults(click.content, click.campaign, click.source);

        if !click.mobile {
            debug!("Desktop click on {}, no intent stored", click.link_id);
            return Ok(ClickOutcome {
                mobile: false,
                record_written: false,
                intent,
                fingerprint: None,
            });
        }

        let fingerprint = fingerprint::build(&click.signals, ObservationContext::Click);
        let record = IntentRecord {
            link_id: click.link_id,
            content: intent.content.clone(),
            campaign: intent.campaign.clone(),
            source: intent.source.clone(),
            fingerprint: fingerprint.clone(),
            signals: click.signals.capture(),
            created_at: self.clock.now_millis(),
        };

        self.store
            .put(&fingerprint, &record, INTENT_TTL_SECONDS)
            .await?;
        info!(
            "Stored intent for link {} (content: {}, campaign: {}) under {}",
            record.link_id,
            record.content,
            record.campaign,
            fingerprint.short()
        );

        Ok(ClickOutcome {
            mobile: true,
            record_written: true,
            intent,
            fingerprint: Some(fingerprint),
        })
    }

    /// Looks up the intent for an installed app's first launch.
    ///
    /// `signals` is required; `app_info.version` fills in a missing client version.
    pub async fn resolve_query(
        &self,
        signals: Option<SignalTuple>,
        app_info: Option<AppInfo>,
    ) -> Result<Resolution> {
        let mut signals = signals
            .ok_or_else(|| AttributionError::Validation("deviceInfo is required".to_string()))?;

        if present(&signals.client_version).is_none() {
            signals.client_version = app_info
                .and_then(|info| info.version)
                .filter(|v| !v.is_empty());
        }

        let fingerprint = fingerprint::build(&signals, ObservationContext::PostInstall);
        let result = self.resolve(&fingerprint, &signals.capture()).await;

        match &result {
            Ok(resolution) => {
                info!("Query {} resolved: {}", fingerprint.short(), resolution.label());
                metrics::inc_outcome(resolution.label());
                if resolution.found() {
                    self.bump_counter(CounterKind::Success);
                }
            }
            Err(e) => {
                error!("Query {} failed: {}", fingerprint.short(), e);
                metrics::inc_outcome("error");
                self.bump_counter(CounterKind::Error);
            }
        }

        result
    }

    async fn resolve(&self, fingerprint: &Fingerprint, query: &CapturedSignals) -> Result<Resolution> {
        let candidates = match self.store.get(fingerprint).await? {
            Some(record) => vec![record],
            None => {
                let bucket = bucket_for(query.network_address.as_deref());
                self.store.candidates(&bucket).await?
            }
        };

        if candidates.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let now = self.clock.now_millis();
        let mut best: Option<(IntentRecord, f64)> = None;
        for record in candidates {
            if record.is_stale(now, INTENT_TTL_SECONDS) {
                debug!("Purging stale intent {} for link {}", record.fingerprint.short(), record.link_id);
                self.store.remove(&record).await?;
                continue;
            }

            let score = matcher::score(&record.signals, query);
            let keep_current = match &best {
                Some((current, current_score)) => {
                    *current_score > score
                        || (*current_score == score && current.created_at >= record.created_at)
                }
                None => false,
            };
            if !keep_current {
                best = Some((record, score));
            }
        }

        match best {
            None => Ok(Resolution::Expired),
            Some((_, score)) if !matcher::is_match(score) => Ok(Resolution::Mismatch { score }),
            Some((record, score)) => {
                self.store.remove(&record).await?;
                Ok(Resolution::Matched(MatchedIntent {
                    link_id: record.link_id,
                    content: record.content,
                    campaign: record.campaign,
                    source: record.source,
                    score,
                    timestamp: record.created_at,
                }))
            }
        }
    }

    /// Fire-and-forget increment of today's counter.
    fn bump_counter(&self, kind: CounterKind) {
        let store = self.store.clone();
        let day = self.clock.now().date_naive();
        tokio::spawn(async move {
            if let Err(e) = store.increment_counter(kind, day).await {
                warn!("Failed to update {} stats: {}", kind.as_str(), e);
            }
        });
    }
}
