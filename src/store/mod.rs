//! Shared counter store used by the remote-store rate limiter.
//!
//! The limiter only needs a handful of list and integer primitives, each of
//! which is atomic on its own at the store. Sequences of primitives are not
//! transactional; callers issue them one after another.

mod redis;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::redis::RedisStore;

/// Errors that can occur talking to the counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("{command} timed out after {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: Duration,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// The primitives the remote-store limiter issues against a shared store.
///
/// Names and semantics follow the Redis commands of the same name.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Push `value` onto the head of the list, returning the new length.
    async fn lpush(&self, key: &str, value: i64) -> Result<i64, StoreError>;

    /// Keep only the elements between `start` and `stop` (inclusive).
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError>;

    /// Length of the list, zero if absent.
    async fn llen(&self, key: &str) -> Result<i64, StoreError>;

    /// Element at `index`; negative indexes count from the tail.
    async fn lindex(&self, key: &str, index: isize) -> Result<Option<i64>, StoreError>;

    /// Elements between `start` and `stop` (inclusive).
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<i64>, StoreError>;

    /// Atomically add `delta` to an integer, creating it at zero, returning the result.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Read an integer value.
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Expire the key `ttl` from now.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}
