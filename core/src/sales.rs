//! Synchronous peer port for sales figures.
//!
//! Only custom report generation calls it. The response body is opaque here.

use crate::report::{DateRange, ReportFilter};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from the sales peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The peer could not be reached
    #[error("Sales service unreachable: {0}")]
    Unreachable(String),

    /// The peer answered with a non-success status
    #[error("Sales service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The peer answered with a body that is not JSON
    #[error("Sales service returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Source of sales figures for a window and filter.
pub trait SalesDataSource: Send + Sync {
    /// Fetch sales data.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] if the peer call fails.
    fn fetch_sales(
        &self,
        date_range: Option<&DateRange>,
        filter: &ReportFilter,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, PeerError>> + Send + '_>>;
}
