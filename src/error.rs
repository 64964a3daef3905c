//! Error types for the channel quota engine.

use thiserror::Error;

use crate::ratelimit::Dimension;
use crate::store::StoreError;

/// Returned by `check` when a dimension has reached its limit in the active window.
///
/// This is the only failure callers ever see from the admission path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("model {model} {dimension} limit exceeded")]
pub struct Saturated {
    /// Channel the request was aimed at
    pub channel_id: i64,
    /// Model name the request was aimed at
    pub model: String,
    /// The dimension that triggered the rejection
    pub dimension: Dimension,
}

impl Saturated {
    pub fn new(channel_id: i64, model: &str, dimension: Dimension) -> Self {
        Self {
            channel_id,
            model: model.to_string(),
            dimension,
        }
    }
}

/// Main error type for setup and configuration.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote store errors (only surfaced while connecting)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for channel quota operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
