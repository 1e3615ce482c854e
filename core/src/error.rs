//! Operation-level error taxonomy.
//!
//! Only two things can fail a lifecycle call: an invalid payload (before any
//! port is touched) and a primary store failure. Everything after the primary
//! write is a [`SecondaryFailure`], which is logged and counted but never
//! returned.

use crate::report::ValidationError;
use crate::store::StoreError;
use crate::telemetry::SecondaryStep;
use std::fmt;
use thiserror::Error;

/// Errors returned by `ReportLifecycle` operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// The payload violates an entity invariant
    #[error("Invalid report: {0}")]
    Validation(#[from] ValidationError),

    /// The primary store failed
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// A best-effort step that failed after the primary step succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryFailure {
    /// Which step failed
    pub step: SecondaryStep,
    /// Error or timeout description
    pub reason: String,
}

impl SecondaryFailure {
    /// Describe a failed step.
    #[must_use]
    pub fn new(step: SecondaryStep, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SecondaryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.reason)
    }
}

/// Why an inbound event could not become a report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestionError {
    /// The body is not valid JSON
    #[error("Malformed event on '{topic}': {reason}")]
    Malformed {
        /// Source topic
        topic: String,
        /// Parser error
        reason: String,
    },

    /// The synthetic create failed
    #[error("Report creation failed for event on '{topic}': {source}")]
    Downstream {
        /// Source topic
        topic: String,
        /// The lifecycle error
        source: ReportError,
    },
}
