//! Cache store port.
//!
//! The cache is an accelerator, never a source of truth. Callers treat every
//! error here as a miss (on read) or a skipped mirror (on write).

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from a cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backend could not be reached
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected a command
    #[error("Cache command '{command}' failed: {reason}")]
    Command {
        /// Command name (`SET`, `GET`, `DEL`)
        command: &'static str,
        /// Backend error text
        reason: String,
    },

    /// A value could not be encoded for the cache
    #[error("Cache serialization failed: {0}")]
    Serialization(String),
}

/// Boxed future returned by [`CacheStore`] methods.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Key/value cache port.
///
/// No ordering guarantee between calls, and entries may expire at any time.
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn set(&self, key: &str, value: &[u8]) -> CacheFuture<'_, ()>;

    /// Fetch the value under `key`. `Ok(None)` is a miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn get(&self, key: &str) -> CacheFuture<'_, Option<Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn delete(&self, key: &str) -> CacheFuture<'_, ()>;
}
