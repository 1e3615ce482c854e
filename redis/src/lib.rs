//! Redis cache store for the reporting write path.
//!
//! [`RedisCacheStore`] implements the `CacheStore` port with plain string
//! commands on a shared [`ConnectionManager`]:
//!
//! - `set` is `SET key value`, or `SET key value EX ttl` when a TTL is
//!   configured. The TTL bounds how long a snapshot can outlive a failed
//!   eviction.
//! - `get` is `GET key`; a nil reply is a miss.
//! - `delete` is `DEL key`; deleting an absent key succeeds.
//!
//! Values are the JSON bytes produced by the lifecycle manager. This crate
//! never looks inside them.
//!
//! # Example
//!
//! ```no_run
//! use reporting_redis::RedisCacheStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisCacheStore::new("redis://127.0.0.1:6379")
//!     .await?
//!     .with_ttl(Duration::from_secs(3600));
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use reporting_core::cache::{CacheError, CacheFuture, CacheStore};
use std::time::Duration;

/// `Redis`-backed [`CacheStore`].
///
/// Clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn_manager: ConnectionManager,
    ttl: Option<Duration>,
}

impl RedisCacheStore {
    /// Connect to `redis_url` (e.g. `redis://[:password@]host[:port][/db]`).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the URL is malformed or the
    /// server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisCacheStore initialized successfully");

        Ok(Self {
            conn_manager,
            ttl: None,
        })
    }

    /// Expire every entry written from now on after `ttl`.
    ///
    /// Sub-second TTLs are rounded up to one second.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// The configured TTL, if any.
    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn ttl_seconds(&self) -> Option<u64> {
        self.ttl.map(|ttl| ttl.as_secs().max(1))
    }
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Map a redis error into the port's error type.
fn cache_error(command: &'static str, error: &RedisError) -> CacheError {
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        CacheError::Unavailable(format!("{command} failed: {error}"))
    } else {
        CacheError::Command {
            command,
            reason: error.to_string(),
        }
    }
}

impl CacheStore for RedisCacheStore {
    fn set(&self, key: &str, value: &[u8]) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        let value = value.to_vec();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let result: Result<(), RedisError> = match self.ttl_seconds() {
                Some(seconds) => conn.set_ex(&key, value, seconds).await,
                None => conn.set(&key, value).await,
            };
            result.map_err(|e| cache_error("SET", &e))?;

            tracing::trace!(key = %key, ttl_seconds = ?self.ttl_seconds(), "Cached value");
            Ok(())
        })
    }

    fn get(&self, key: &str) -> CacheFuture<'_, Option<Vec<u8>>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: Option<Vec<u8>> = conn
                .get(&key)
                .await
                .map_err(|e| cache_error("GET", &e))?;
            Ok(value)
        })
    }

    fn delete(&self, key: &str) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: u64 = conn
                .del(&key)
                .await
                .map_err(|e| cache_error("DEL", &e))?;

            tracing::trace!(key = %key, removed, "Evicted cache entry");
            Ok(())
        })
    }
}
