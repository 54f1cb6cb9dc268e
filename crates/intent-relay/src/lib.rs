// intent-relay/crates/intent-relay/src/lib.rs

pub mod api;
pub mod attribution;
pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod metrics;
pub mod redirect;
pub mod server;
pub mod shared_state;
pub mod signals;
pub mod store;
pub mod telemetry;

// Public API exports
pub use attribution::{AttributionService, ClickOutcome, ClickRequest, MatchedIntent, Resolution};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::AttributionError;
pub use fingerprint::Fingerprint;
pub use server::{build_router, run_server};
pub use shared_state::AppState;
pub use signals::{AppInfo, ObservationContext, SignalTuple};
pub use store::{
    InMemoryKeyValueStore, IntentRecord, IntentRecordStore, KeyValueStore, SqliteKeyValueStore,
    StoreBackend,
};
