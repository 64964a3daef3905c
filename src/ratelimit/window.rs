//! Quota dimensions and the window bookkeeping shared by both backends.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Length of the RPM sliding window and the TPM fixed window, in seconds.
pub const MINUTE_SECS: i64 = 60;
/// Length of the RPD fixed window, in seconds.
pub const DAY_SECS: i64 = 24 * 3600;
/// RPM history kept for monitoring when the RPM dimension is unlimited.
pub const DEFAULT_RPM_HISTORY_CAP: i64 = 1000;

/// One of the three quota dimensions tracked per (channel, model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Requests per minute, sliding window
    Rpm,
    /// Tokens per minute, fixed window
    Tpm,
    /// Requests per day, fixed window
    Rpd,
}

impl Dimension {
    /// Get the length of this dimension's window in seconds.
    pub fn window_secs(&self) -> i64 {
        match self {
            Dimension::Rpm | Dimension::Tpm => MINUTE_SECS,
            Dimension::Rpd => DAY_SECS,
        }
    }

    /// Get the duration of this dimension's window.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs() as u64)
    }

    /// Upper-case label used in messages and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Rpm => "RPM",
            Dimension::Tpm => "TPM",
            Dimension::Rpd => "RPD",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured limits for one (channel, model) pair.
///
/// A value of zero or below means the dimension is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub rpm: i64,
    pub tpm: i64,
    pub rpd: i64,
}

impl Limits {
    /// Create a new set of limits.
    pub fn new(rpm: i64, tpm: i64, rpd: i64) -> Self {
        Self { rpm, tpm, rpd }
    }

    /// Limits with every dimension unlimited.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Get the limit for a dimension.
    pub fn get(&self, dimension: Dimension) -> i64 {
        match dimension {
            Dimension::Rpm => self.rpm,
            Dimension::Tpm => self.tpm,
            Dimension::Rpd => self.rpd,
        }
    }

    /// Whether the dimension is enforced at all.
    pub fn is_limited(&self, dimension: Dimension) -> bool {
        self.get(dimension) > 0
    }

    /// Number of RPM timestamps to retain: the RPM limit, or `default_cap` if unlimited.
    pub fn rpm_history_cap(&self, default_cap: i64) -> i64 {
        if self.rpm > 0 {
            self.rpm
        } else {
            default_cap.max(1)
        }
    }
}

/// Current usage for one (channel, model) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub rpm: i64,
    pub tpm: i64,
    pub rpd: i64,
}

impl Usage {
    /// Get the usage for a dimension.
    pub fn get(&self, dimension: Dimension) -> i64 {
        match dimension {
            Dimension::Rpm => self.rpm,
            Dimension::Tpm => self.tpm,
            Dimension::Rpd => self.rpd,
        }
    }
}

/// A fixed-window counter: a count plus the absolute time its window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowCounter {
    count: i64,
    expiration: i64,
}

impl FixedWindowCounter {
    /// Open a new window at `now` holding `value`.
    pub fn start(value: i64, now: i64, dimension: Dimension) -> Self {
        Self {
            count: value,
            expiration: now + dimension.window_secs(),
        }
    }

    /// Whether the window is still open at `now`.
    pub fn is_live(&self, now: i64) -> bool {
        now < self.expiration
    }

    /// Get the count, or zero once the window has closed.
    pub fn current(&self, now: i64) -> i64 {
        if self.is_live(now) {
            self.count
        } else {
            0
        }
    }

    /// Add `value`, replacing the counter with a fresh window if it has closed.
    pub fn add(&mut self, value: i64, now: i64, dimension: Dimension) {
        if self.is_live(now) {
            self.count = self.count.saturating_add(value);
        } else {
            *self = Self::start(value, now, dimension);
        }
    }

    /// Absolute time (seconds since epoch) this window closes.
    pub fn expiration(&self) -> i64 {
        self.expiration
    }
}

/// Timestamps of recent requests, oldest first, bounded in length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingWindow {
    timestamps: VecDeque<i64>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count events that happened within the trailing minute.
    pub fn count_within(&self, now: i64) -> i64 {
        self.timestamps
            .iter()
            .filter(|&&ts| now - ts < MINUTE_SECS)
            .count() as i64
    }

    /// Drop aged-out events, append `now` and keep at most `cap` of the newest events.
    pub fn push(&mut self, now: i64, cap: i64) {
        self.timestamps.retain(|&ts| now - ts < MINUTE_SECS);
        self.timestamps.push_back(now);

        let cap = cap.max(1) as usize;
        while self.timestamps.len() > cap {
            self.timestamps.pop_front();
        }
    }

    /// Number of stored timestamps, including aged-out ones not yet trimmed.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
