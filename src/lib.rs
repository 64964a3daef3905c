//! Channel Quota - per-channel, per-model admission control
//!
//! This crate caps how much traffic each (upstream channel, model) pair of
//! an LLM API gateway may receive: requests per minute (sliding window),
//! tokens per minute and requests per day (fixed windows). State lives
//! either in a shared Redis store, for multi-instance deployments, or in
//! process memory; both backends behave identically for callers.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use config::QuotaConfig;
pub use error::{QuotaError, Saturated};
pub use ratelimit::{ChannelRateLimiter, Dimension, Limits, Usage};
