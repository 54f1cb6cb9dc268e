//! Observed device and network signals
//!
//! A [`SignalTuple`] is everything one observation point (the browser click or
//! the freshly installed app) could see about the device. Every field is
//! optional; a missing value is a normal state, never an error.

use serde::{Deserialize, Serialize};

/// Where a set of signals was observed.
///
/// The two contexts share the fingerprint field order but differ in the
/// default substituted for a missing client name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationContext {
    /// First-click browser context, signals parsed from request headers.
    Click,
    /// Post-install app context, signals supplied by the client itself.
    PostInstall,
}

impl ObservationContext {
    /// Literal used when the client name is absent.
    pub fn default_client_name(&self) -> &'static str {
        match self {
            ObservationContext::Click => "unknown",
            ObservationContext::PostInstall => "app",
        }
    }
}

/// Raw identifying evidence captured at one observation point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTuple {
    pub network_address: Option<String>,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub platform_name: Option<String>,
    pub platform_version: Option<String>,
    pub device_model: Option<String>,
    pub locale: Option<String>,
    pub encoding: Option<String>,
}

impl SignalTuple {
    /// True when the platform is one the app ships on (iOS or Android).
    pub fn is_mobile_platform(&self) -> bool {
        matches!(
            present(&self.platform_name),
            Some("iOS") | Some("Android")
        )
    }

    /// The subset of signals kept on an intent record for later scoring.
    pub fn capture(&self) -> CapturedSignals {
        CapturedSignals {
            network_address: present(&self.network_address).map(str::to_string),
            platform_name: present(&self.platform_name).map(str::to_string),
            platform_version: present(&self.platform_version).map(str::to_string),
            client_name: present(&self.client_name).map(str::to_string),
        }
    }
}

/// Signals persisted with an intent record and compared by the matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedSignals {
    pub network_address: Option<String>,
    pub platform_name: Option<String>,
    pub platform_version: Option<String>,
    pub client_name: Option<String>,
}

/// Metadata the installed app reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub version: Option<String>,
}

/// Returns the value when it is set and non-empty.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
