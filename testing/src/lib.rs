//! # Reporting Testing
//!
//! In-memory implementations of every port in `reporting-core`, for fast,
//! deterministic tests of the lifecycle manager and the ingestion worker.
//!
//! This crate provides:
//! - [`InMemoryReportStore`], [`InMemoryCacheStore`], [`InMemoryEventBus`]
//! - [`RecordingTelemetry`] and [`StubSalesSource`]
//! - [`CallLog`], a shared log that proves the order in which ports were hit
//! - Deterministic clocks
//!
//! Every fake is `Clone` and shares state between clones, so a test keeps one
//! handle for assertions and gives another to the code under test.
//!
//! ## Example
//!
//! ```
//! use reporting_testing::{CallLog, InMemoryCacheStore, InMemoryReportStore, Port};
//!
//! let log = CallLog::new();
//! let store = InMemoryReportStore::new().with_call_log(log.clone());
//! let cache = InMemoryCacheStore::new().with_call_log(log.clone());
//!
//! assert!(log.ports().is_empty());
//! # let _ = (store, cache, Port::Store);
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure unwraps poisoned locks
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use reporting_core::environment::Clock;

pub mod cache;
pub mod call_log;
pub mod event_bus;
pub mod sales;
pub mod store;
pub mod telemetry;

/// Deterministic clocks.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use reporting_testing::mocks::FixedClock;
    /// use reporting_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to. Clones share the same time.
    ///
    /// ```
    /// use reporting_testing::mocks::ManualClock;
    /// use reporting_core::environment::Clock;
    ///
    /// let clock = ManualClock::starting_at(reporting_testing::test_clock().now());
    /// let before = clock.now();
    /// clock.advance(chrono::Duration::seconds(5));
    /// assert_eq!(clock.now() - before, chrono::Duration::seconds(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move time forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use cache::InMemoryCacheStore;
pub use call_log::{CallLog, Port};
pub use event_bus::InMemoryEventBus;
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use sales::StubSalesSource;
pub use store::InMemoryReportStore;
pub use telemetry::RecordingTelemetry;
