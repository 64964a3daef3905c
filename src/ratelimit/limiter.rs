//! In-process rate limiter for single-instance deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::key::ChannelModelKey;
use super::window::{
    Dimension, FixedWindowCounter, Limits, SlidingWindow, Usage, DEFAULT_RPM_HISTORY_CAP,
};
use crate::error::Saturated;

/// All counters kept for one (channel, model) pair.
#[derive(Debug, Default)]
struct KeyState {
    rpm: SlidingWindow,
    tpm: Option<FixedWindowCounter>,
    rpd: Option<FixedWindowCounter>,
}

impl KeyState {
    fn usage(&self, now: i64) -> Usage {
        Usage {
            rpm: self.rpm.count_within(now),
            tpm: self.tpm.map_or(0, |c| c.current(now)),
            rpd: self.rpd.map_or(0, |c| c.current(now)),
        }
    }
}

/// Rate limiter backed by process-local maps.
///
/// State is sharded by key, so unrelated (channel, model) pairs do not
/// contend with each other while every `check`/`record` stays atomic for
/// its own key. Entries are never purged; a stale entry is superseded the
/// next time its key is recorded.
pub struct MemoryRateLimiter {
    /// Counters indexed by (channel, model)
    entries: DashMap<ChannelModelKey, KeyState>,
    /// Time source for window math
    clock: Arc<dyn Clock>,
    /// RPM history kept when the RPM dimension is unlimited
    rpm_history_cap: i64,
}

impl MemoryRateLimiter {
    /// Create a new in-process rate limiter using the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_RPM_HISTORY_CAP)
    }

    /// Create a new in-process rate limiter with an explicit clock and history cap.
    pub fn with_clock(clock: Arc<dyn Clock>, rpm_history_cap: i64) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            rpm_history_cap,
        }
    }

    /// Get the number of (channel, model) pairs that have ever been recorded.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(slot: &mut Option<FixedWindowCounter>, value: i64, now: i64, dimension: Dimension) {
    match slot {
        Some(counter) => counter.add(value, now, dimension),
        None => *slot = Some(FixedWindowCounter::start(value, now, dimension)),
    }
}

#[async_trait]
impl RateLimiterBackend for MemoryRateLimiter {
    async fn check(&self, channel_id: i64, model: &str, limits: Limits) -> Result<(), Saturated> {
        let key = ChannelModelKey::new(channel_id, model);
        let now = self.clock.now();

        trace!(key = %key, ?limits, "Checking in-process rate limit");

        let usage = match self.entries.get(&key) {
            Some(state) => state.usage(now),
            None => return Ok(()),
        };

        for dimension in [Dimension::Rpm, Dimension::Rpd, Dimension::Tpm] {
            let limit = limits.get(dimension);
            let current = usage.get(dimension);
            if limit > 0 && current >= limit {
                debug!(
                    key = %key,
                    dimension = %dimension,
                    current = current,
                    limit = limit,
                    "Rate limit saturated"
                );
                return Err(Saturated::new(channel_id, model, dimension));
            }
        }

        Ok(())
    }

    async fn record(&self, channel_id: i64, model: &str, limits: Limits, tokens: i64) {
        let key = ChannelModelKey::new(channel_id, model);
        let now = self.clock.now();
        let cap = limits.rpm_history_cap(self.rpm_history_cap);

        trace!(key = %key, tokens = tokens, "Recording in-process usage");

        let mut entry = self.entries.entry(key).or_default();
        let state = entry.value_mut();

        state.rpm.push(now, cap);
        bump(&mut state.rpd, 1, now, Dimension::Rpd);
        if tokens > 0 {
            bump(&mut state.tpm, tokens, now, Dimension::Tpm);
        }
    }

    async fn usage(&self, channel_id: i64, model: &str) -> Usage {
        let key = ChannelModelKey::new(channel_id, model);
        let now = self.clock.now();
        self.entries
            .get(&key)
            .map(|state| state.usage(now))
            .unwrap_or_default()
    }
}
