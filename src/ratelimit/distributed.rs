//! Rate limiter backed by a shared counter store.
//!
//! This limiter keeps its state in a store shared by every gateway
//! instance, so quotas are enforced across processes. Each check and
//! record is a sequence of independent store primitives; concurrent
//! callers may interleave between them, trading a little precision for
//! O(1) work per call.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::backend::RateLimiterBackend;
use super::clock::Clock;
use super::key::ChannelModelKey;
use super::window::{Dimension, Limits, Usage, MINUTE_SECS};
use crate::error::Saturated;
use crate::store::{CounterStore, StoreError};

/// A rate limiter whose counters live in a shared `CounterStore`.
///
/// Store failures never block traffic: reads that fail during `check` are
/// treated as "no data yet", and a failed write in one dimension does not
/// stop the other dimensions from being recorded.
pub struct RemoteRateLimiter<S: CounterStore> {
    /// The shared store.
    store: S,
    /// Time source for pushed timestamps and window comparisons.
    clock: Arc<dyn Clock>,
    /// RPM history kept when the RPM dimension is unlimited.
    rpm_history_cap: i64,
}

impl<S: CounterStore> RemoteRateLimiter<S> {
    /// Create a new remote-store rate limiter.
    pub fn with_clock(store: S, clock: Arc<dyn Clock>, rpm_history_cap: i64) -> Self {
        Self {
            store,
            clock,
            rpm_history_cap,
        }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether the `limit`-th newest RPM timestamp is still inside the window.
    ///
    /// The list may hold more than `limit` entries when history was kept
    /// under a higher cap, so the entry at index `limit - 1` is read rather
    /// than the tail. Timestamps are pushed in time order, so that entry
    /// being in the window means at least `limit` requests are.
    async fn rpm_saturated(&self, key: &str, limit: i64, now: i64) -> bool {
        let len = match self.store.llen(key).await {
            Ok(len) => len,
            Err(e) => {
                fail_open(key, &e);
                return false;
            }
        };
        if len < limit {
            return false;
        }

        match self.store.lindex(key, (limit - 1) as isize).await {
            Ok(Some(nth)) => now - nth < MINUTE_SECS,
            Ok(None) => false,
            Err(e) => {
                fail_open(key, &e);
                false
            }
        }
    }

    /// Whether a fixed-window counter has reached `limit`.
    async fn counter_reached(&self, key: &str, limit: i64) -> bool {
        match self.store.get(key).await {
            Ok(value) => value.unwrap_or(0) >= limit,
            Err(e) => {
                fail_open(key, &e);
                false
            }
        }
    }

    async fn record_rpm(&self, key: &str, cap: i64, now: i64) {
        if let Err(e) = self.store.lpush(key, now).await {
            write_failed(Dimension::Rpm, key, &e);
            return;
        }
        // The fresh timestamp already sits at the head, so keep indexes 0..=cap-1.
        if let Err(e) = self.store.ltrim(key, 0, (cap - 1) as isize).await {
            write_failed(Dimension::Rpm, key, &e);
        }
        if let Err(e) = self.store.expire(key, Dimension::Rpm.window()).await {
            write_failed(Dimension::Rpm, key, &e);
        }
    }

    /// Add `amount` to a fixed-window counter, opening the window on the first write.
    async fn record_counter(&self, dimension: Dimension, key: &str, amount: i64) {
        match self.store.incr_by(key, amount).await {
            Ok(value) if value == amount => {
                if let Err(e) = self.store.expire(key, dimension.window()).await {
                    write_failed(dimension, key, &e);
                }
            }
            Ok(_) => {}
            Err(e) => write_failed(dimension, key, &e),
        }
    }

    async fn read_rpm(&self, key: &str, now: i64) -> i64 {
        match self.store.lrange(key, 0, -1).await {
            Ok(timestamps) => timestamps
                .iter()
                .filter(|&&ts| now - ts < MINUTE_SECS)
                .count() as i64,
            Err(e) => {
                read_failed(key, &e);
                0
            }
        }
    }

    async fn read_counter(&self, key: &str) -> i64 {
        match self.store.get(key).await {
            Ok(value) => value.unwrap_or(0),
            Err(e) => {
                read_failed(key, &e);
                0
            }
        }
    }
}

fn fail_open(key: &str, error: &StoreError) {
    warn!(key = %key, error = %error, "Store read failed during check, treating as unsaturated");
}

fn write_failed(dimension: Dimension, key: &str, error: &StoreError) {
    warn!(key = %key, dimension = %dimension, error = %error, "Store write failed, usage not recorded");
}

fn read_failed(key: &str, error: &StoreError) {
    warn!(key = %key, error = %error, "Store read failed, reporting zero usage");
}

#[async_trait]
impl<S: CounterStore> RateLimiterBackend for RemoteRateLimiter<S> {
    async fn check(&self, channel_id: i64, model: &str, limits: Limits) -> Result<(), Saturated> {
        let key = ChannelModelKey::new(channel_id, model);
        let now = self.clock.now();

        trace!(key = %key, ?limits, "Checking remote rate limit");

        let saturated = if limits.rpm > 0
            && self
                .rpm_saturated(&key.store_key(Dimension::Rpm), limits.rpm, now)
                .await
        {
            Some(Dimension::Rpm)
        } else if limits.rpd > 0
            && self
                .counter_reached(&key.store_key(Dimension::Rpd), limits.rpd)
                .await
        {
            Some(Dimension::Rpd)
        } else if limits.tpm > 0
            && self
                .counter_reached(&key.store_key(Dimension::Tpm), limits.tpm)
                .await
        {
            Some(Dimension::Tpm)
        } else {
            None
        };

        match saturated {
            Some(dimension) => {
                debug!(
                    key = %key,
                    dimension = %dimension,
                    limit = limits.get(dimension),
                    "Remote rate limit saturated"
                );
                Err(Saturated::new(channel_id, model, dimension))
            }
            None => Ok(()),
        }
    }

    async fn record(&self, channel_id: i64, model: &str, limits: Limits, tokens: i64) {
        let key = ChannelModelKey::new(channel_id, model);
        let now = self.clock.now();
        let cap = limits.rpm_history_cap(self.rpm_history_cap);

        trace!(key = %key, tokens = tokens, "Recording remote usage");

        let rpm_key = key.store_key(Dimension::Rpm);
        let rpd_key = key.store_key(Dimension::Rpd);
        let tpm_key = key.store_key(Dimension::Tpm);

        futures::join!(
            self.record_rpm(&rpm_key, cap, now),
            self.record_counter(Dimension::Rpd, &rpd_key, 1),
            async {
                if tokens > 0 {
                    self.record_counter(Dimension::Tpm, &tpm_key, tokens).await;
                }
            },
        );
    }

    async fn usage(&self, channel_id: i64, model: &str) -> Usage {
        let key = ChannelModelKey::new(channel_id, model);
        let now = self.clock.now();

        let rpm_key = key.store_key(Dimension::Rpm);
        let tpm_key = key.store_key(Dimension::Tpm);
        let rpd_key = key.store_key(Dimension::Rpd);

        let (rpm, tpm, rpd) = futures::join!(
            self.read_rpm(&rpm_key, now),
            self.read_counter(&tpm_key),
            self.read_counter(&rpd_key),
        );

        Usage { rpm, tpm, rpd }
    }
}
