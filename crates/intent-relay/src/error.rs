//! Failure outcomes of the attribution core
//!
//! Negative findings (no record, expired, mismatch) are not errors; they are
//! ordinary [`crate::attribution::Resolution`] values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttributionError {
    /// A required input was missing. No store call was made.
    #[error("{0}")]
    Validation(String),
    /// The backing store failed. Not retried.
    #[error("Store unavailable: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl AttributionError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, AttributionError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, AttributionError>;
