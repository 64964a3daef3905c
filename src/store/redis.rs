//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisFuture};
use std::time::Duration;
use tracing::info;

use super::{CounterStore, StoreError};

/// Counter store backed by a Redis server.
///
/// A single multiplexed connection is opened at startup and cloned per
/// command; every command is bounded by `command_timeout`.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str, command_timeout: Duration) -> Result<Self, StoreError> {
        info!(timeout = ?command_timeout, "Connecting to Redis counter store");

        let client = redis::Client::open(url)?;
        let conn = match tokio::time::timeout(
            command_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(conn) => conn?,
            Err(_) => {
                return Err(StoreError::Timeout {
                    command: "CONNECT",
                    timeout: command_timeout,
                })
            }
        };

        info!("Connected to Redis counter store");

        Ok(Self {
            conn,
            command_timeout,
        })
    }

    /// Run one command under the configured timeout.
    async fn run<T>(&self, command: &'static str, fut: RedisFuture<'_, T>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout {
                command,
                timeout: self.command_timeout,
            }),
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn lpush(&self, key: &str, value: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let fut: RedisFuture<'_, i64> = conn.lpush(key, value);
        self.run("LPUSH", fut).await
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let fut: RedisFuture<'_, ()> = conn.ltrim(key, start, stop);
        self.run("LTRIM", fut).await
    }

    async fn llen(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let fut: RedisFuture<'_, i64> = conn.llen(key);
        self.run("LLEN", fut).await
    }

    async fn lindex(&self, key: &str, index: isize) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let fut: RedisFuture<'_, Option<i64>> = conn.lindex(key, index);
        self.run("LINDEX", fut).await
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let fut: RedisFuture<'_, Vec<i64>> = conn.lrange(key, start, stop);
        self.run("LRANGE", fut).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let fut: RedisFuture<'_, i64> = conn.incr(key, delta);
        self.run("INCRBY", fut).await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let fut: RedisFuture<'_, Option<i64>> = conn.get(key);
        self.run("GET", fut).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs() as i64;
        let fut: RedisFuture<'_, ()> = conn.expire(key, seconds);
        self.run("EXPIRE", fut).await
    }
}
