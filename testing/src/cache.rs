//! In-memory cache store.

use crate::call_log::{CallLog, Port, record};
use reporting_core::cache::{CacheError, CacheFuture, CacheStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// `HashMap`-backed [`CacheStore`] with failure and latency injection.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
    failing_deletes: Arc<AtomicBool>,
    latency: Arc<Mutex<Option<Duration>>>,
    log: Option<CallLog>,
}

impl InMemoryCacheStore {
    /// Create a new empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every call in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Make every call fail as if the backend were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only `delete` fail.
    pub fn set_failing_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Write raw bytes without going through the port.
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
    }

    /// Raw bytes under `key`.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// Decode the JSON value under `key`.
    #[must_use]
    pub fn peek_json(&self, key: &str) -> Option<serde_json::Value> {
        self.peek(key)
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// Check if a key exists
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().unwrap().contains_key(key)
    }

    /// All keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn enter(&self, method: &'static str, key: &str) -> Result<(), CacheError> {
        record(self.log.as_ref(), Port::Cache, method, key);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache is down".into()));
        }
        Ok(())
    }
}

impl CacheStore for InMemoryCacheStore {
    fn set(&self, key: &str, value: &[u8]) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        let value = value.to_vec();
        Box::pin(async move {
            self.enter("set", &key).await?;
            self.entries.write().unwrap().insert(key, value);
            Ok(())
        })
    }

    fn get(&self, key: &str) -> CacheFuture<'_, Option<Vec<u8>>> {
        let key = key.to_string();
        Box::pin(async move {
            self.enter("get", &key).await?;
            Ok(self.peek(&key))
        })
    }

    fn delete(&self, key: &str) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            self.enter("delete", &key).await?;
            if self.failing_deletes.load(Ordering::SeqCst) {
                return Err(CacheError::Command {
                    command: "DEL",
                    reason: "injected failure".into(),
                });
            }
            self.entries.write().unwrap().remove(&key);
            Ok(())
        })
    }
}
