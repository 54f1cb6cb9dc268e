//! State shared by every HTTP handler
//!
//! Cheap to clone: the service holds its store and clock behind `Arc`s.

use std::sync::Arc;

use crate::attribution::AttributionService;
use crate::config::Config;
use crate::redirect::PresentationConfig;
use crate::store::{IntentRecordStore, KeyValueStore};

#[derive(Clone)]
pub struct AppState {
    pub service: AttributionService,
    pub presentation: Arc<PresentationConfig>,
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn new(
        service: AttributionService,
        presentation: PresentationConfig,
        trust_proxy_headers: bool,
    ) -> Self {
        Self {
            service,
            presentation: Arc::new(presentation),
            trust_proxy_headers,
        }
    }

    /// Builds the state over an already opened key-value store.
    pub fn from_config(cfg: &Config, kv: Arc<dyn KeyValueStore>) -> Self {
        Self::new(
            AttributionService::new(IntentRecordStore::new(kv)),
            cfg.presentation.clone(),
            cfg.trust_proxy_headers,
        )
    }
}
