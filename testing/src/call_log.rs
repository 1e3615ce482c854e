//! Shared log of port calls.
//!
//! Fakes configured with the same [`CallLog`] append to it on every call, so a
//! test can assert that the primary store was hit before the cache and the
//! cache before the publisher.

use std::sync::{Arc, Mutex};

/// Which port a call went to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Port {
    /// Primary store
    Store,
    /// Cache store
    Cache,
    /// Event bus
    Bus,
    /// Sales peer
    Sales,
}

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortCall {
    /// Port that was called
    pub port: Port,
    /// Method name, e.g. `"insert"` or `"set"`
    pub method: &'static str,
    /// Key, id, or topic the call targeted, if any
    pub target: Option<String>,
}

/// Append-only, clone-shared call log.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<PortCall>>>,
}

impl CallLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call.
    pub fn record(&self, port: Port, method: &'static str, target: Option<String>) {
        self.calls.lock().unwrap().push(PortCall {
            port,
            method,
            target,
        });
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<PortCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Ports hit so far, in order.
    #[must_use]
    pub fn ports(&self) -> Vec<Port> {
        self.calls.lock().unwrap().iter().map(|c| c.port).collect()
    }

    /// `(port, method)` pairs so far, in order.
    #[must_use]
    pub fn methods(&self) -> Vec<(Port, &'static str)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.port, c.method))
            .collect()
    }

    /// Number of calls to `port`.
    #[must_use]
    pub fn count(&self, port: Port) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.port == port)
            .count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Optional log held by each fake.
pub(crate) fn record(log: Option<&CallLog>, port: Port, method: &'static str, target: &str) {
    if let Some(log) = log {
        log.record(port, method, Some(target.to_string()));
    }
}
