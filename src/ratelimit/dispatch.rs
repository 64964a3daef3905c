//! Routes the public operations to whichever backend the process was configured with.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::backend::RateLimiterBackend;
use super::clock::SystemClock;
use super::distributed::RemoteRateLimiter;
use super::limiter::MemoryRateLimiter;
use super::window::{Limits, Usage};
use crate::config::QuotaConfig;
use crate::error::{Result, Saturated};
use crate::store::RedisStore;

/// Which backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Shared remote store, for multi-instance deployments
    Remote,
    /// Process-local maps, for single-instance deployments
    InProcess,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Remote => f.write_str("remote"),
            BackendKind::InProcess => f.write_str("in-process"),
        }
    }
}

/// The process-wide channel rate limiter.
///
/// Built once at startup; the choice of backend is a deployment decision
/// and does not change what callers observe.
#[derive(Clone)]
pub struct ChannelRateLimiter {
    kind: BackendKind,
    backend: Arc<dyn RateLimiterBackend>,
}

impl ChannelRateLimiter {
    /// Build the limiter described by `config`.
    ///
    /// A configured Redis URL selects the remote backend; otherwise the
    /// in-process backend is used.
    pub async fn from_config(config: &QuotaConfig) -> Result<Self> {
        let history_cap = config.rate_limiting.rpm_history_cap;

        let limiter = match config.redis_url() {
            Some(url) => {
                let timeout = Duration::from_millis(config.store.command_timeout_ms);
                let store = RedisStore::connect(url, timeout).await?;
                let remote = RemoteRateLimiter::with_clock(store, Arc::new(SystemClock), history_cap);
                Self::with_backend(BackendKind::Remote, Arc::new(remote))
            }
            None => Self::with_backend(
                BackendKind::InProcess,
                Arc::new(MemoryRateLimiter::with_clock(Arc::new(SystemClock), history_cap)),
            ),
        };

        info!(backend = %limiter.kind, rpm_history_cap = history_cap, "Channel rate limiter initialized");
        Ok(limiter)
    }

    /// Wrap an already-built backend.
    pub fn with_backend(kind: BackendKind, backend: Arc<dyn RateLimiterBackend>) -> Self {
        Self { kind, backend }
    }

    /// Get the active backend kind.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Check whether a request may be sent to `channel_id` for `model`.
    pub async fn check(&self, channel_id: i64, model: &str, limits: Limits) -> std::result::Result<(), Saturated> {
        self.backend.check(channel_id, model, limits).await
    }

    /// Record a completed request and the tokens it consumed.
    pub async fn record(&self, channel_id: i64, model: &str, limits: Limits, tokens: i64) {
        self.backend.record(channel_id, model, limits, tokens).await
    }

    /// Read current usage for display.
    pub async fn usage(&self, channel_id: i64, model: &str) -> Usage {
        self.backend.usage(channel_id, model).await
    }
}
