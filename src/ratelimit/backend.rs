//! Rate limiter trait for abstracting in-process and remote-store implementations.

use async_trait::async_trait;

use super::window::{Limits, Usage};
use crate::error::Saturated;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over both the `MemoryRateLimiter` and the
/// `RemoteRateLimiter` so the dispatcher can route to either. Both must
/// produce the same results for the same sequence of calls and clock times.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check whether a request for `(channel_id, model)` may be admitted.
    ///
    /// Dimensions are checked in RPM, RPD, TPM order and the first saturated
    /// one is reported. Never has side effects.
    async fn check(&self, channel_id: i64, model: &str, limits: Limits) -> Result<(), Saturated>;

    /// Record a completed request that consumed `tokens` tokens.
    async fn record(&self, channel_id: i64, model: &str, limits: Limits, tokens: i64);

    /// Read current usage for `(channel_id, model)`.
    async fn usage(&self, channel_id: i64, model: &str) -> Usage;
}
