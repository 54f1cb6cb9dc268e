//! Fingerprint builder
//!
//! Derives a fixed-length identifier from the eight signal fields. Both the
//! click side and the post-install side go through [`build`], so the field
//! order and the default substitution can never drift apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signals::{present, ObservationContext, SignalTuple};

const UNKNOWN: &str = "unknown";
const SEPARATOR: &str = "|";

/// Lowercase hex digest identifying one observed device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps a digest read back from storage.
    pub fn from_hex(hex: &str) -> Self {
        Fingerprint(hex.to_string())
    }

    /// Accepts only a well-formed digest: 64 lowercase hex characters.
    pub fn parse(hex: &str) -> Option<Self> {
        let well_formed = hex.len() == 64
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Fingerprint(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves every field to its string form, in fingerprint order.
pub fn resolved_fields(signals: &SignalTuple, context: ObservationContext) -> [&str; 8] {
    [
        present(&signals.network_address).unwrap_or(UNKNOWN),
        present(&signals.client_name).unwrap_or(context.default_client_name()),
        present(&signals.client_version).unwrap_or(UNKNOWN),
        present(&signals.platform_name).unwrap_or(UNKNOWN),
        present(&signals.platform_version).unwrap_or(UNKNOWN),
        present(&signals.device_model).unwrap_or(UNKNOWN),
        present(&signals.locale).unwrap_or(""),
        present(&signals.encoding).unwrap_or(""),
    ]
}

/// Builds the fingerprint for `signals` observed in `context`.
pub fn build(signals: &SignalTuple, context: ObservationContext) -> Fingerprint {
    let joined = resolved_fields(signals, context).join(SEPARATOR);
    Fingerprint(blake3::hash(joined.as_bytes()).to_hex().to_string())
}
