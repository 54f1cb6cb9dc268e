//! Approximate device matching
//!
//! Compares the signals captured at click time with the signals reported by a
//! post-install query. Only fields populated on both sides are comparable; the
//! score is the share of comparable fields that agree.

use crate::signals::{present, CapturedSignals};

/// Minimum score for a query to be treated as the device that clicked.
pub const MATCH_THRESHOLD: f64 = 0.6;

/// One comparable field and the rule used to compare it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    PlatformName,
    PlatformVersion,
    NetworkAddress,
}

impl MatchField {
    /// Fields that contribute to the score.
    pub const ALL: [MatchField; 3] = [
        MatchField::PlatformName,
        MatchField::PlatformVersion,
        MatchField::NetworkAddress,
    ];

    fn value<'a>(&self, signals: &'a CapturedSignals) -> Option<&'a str> {
        match self {
            MatchField::PlatformName => present(&signals.platform_name),
            MatchField::PlatformVersion => present(&signals.platform_version),
            MatchField::NetworkAddress => present(&signals.network_address),
        }
    }

    fn agrees(&self, stored: &str, query: &str) -> bool {
        match self {
            MatchField::PlatformName => stored == query,
            MatchField::PlatformVersion => major_version(stored) == major_version(query),
            MatchField::NetworkAddress => network_bucket(stored) == network_bucket(query),
        }
    }
}

/// Per-field comparison counts behind a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchBreakdown {
    pub agreeing: usize,
    pub total_checks: usize,
}

impl MatchBreakdown {
    pub fn score(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.agreeing as f64 / self.total_checks as f64
    }
}

/// Segment of a version string before the first `.`.
pub fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// First three dot-separated segments of an address (the IPv4 /24).
///
/// Addresses without dots (IPv6, "unknown") come back whole.
pub fn network_bucket(address: &str) -> String {
    address.split('.').take(3).collect::<Vec<_>>().join(".")
}

pub fn compare(stored: &CapturedSignals, query: &CapturedSignals) -> MatchBreakdown {
    MatchField::ALL
        .iter()
        .fold(MatchBreakdown::default(), |mut acc, field| {
            if let (Some(s), Some(q)) = (field.value(stored), field.value(query)) {
                acc.total_checks += 1;
                if field.agrees(s, q) {
                    acc.agreeing += 1;
                }
            }
            acc
        })
}

/// Similarity in `[0, 1]`; zero when nothing is comparable.
pub fn score(stored: &CapturedSignals, query: &CapturedSignals) -> f64 {
    compare(stored, query).score()
}

pub fn is_match(score: f64) -> bool {
    score >= MATCH_THRESHOLD
}
