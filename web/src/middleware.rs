//! Request correlation and the per-request span.
//!
//! [`correlate`] is the outermost middleware. For every request it:
//!
//! - resolves the correlation id (the client's `X-Correlation-ID` header
//!   when it holds a UUID, a fresh UUID v4 otherwise) and stores it in the
//!   request extensions
//! - opens the `http_request` span that the trace layer and the lifecycle
//!   spans nest under
//! - records the response status on that span, plus the report id when the
//!   handler answered with a [`ReportId`] response extension
//! - echoes the correlation id in the response header
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn};
//! use reporting_web::middleware::correlate;
//!
//! let app = Router::new()
//!     .route("/reports", get(list_reports))
//!     .layer(from_fn(correlate));
//! ```

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use reporting_core::report::ReportId;
use tracing::Instrument;
use tracing::field::Empty;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlate a request, run it inside its `http_request` span, and tag the
/// response.
pub async fn correlate(mut req: Request, next: Next) -> Response {
    let correlation_id = correlation_id_from(req.headers()).unwrap_or_else(Uuid::new_v4);
    req.extensions_mut().insert(correlation_id);

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %req.method(),
        path = %req.uri().path(),
        status = Empty,
        report_id = Empty,
    );

    let mut response = next.run(req).instrument(span.clone()).await;

    span.record("status", response.status().as_u16());
    if let Some(id) = response.extensions().get::<ReportId>() {
        span.record("report_id", id.as_str());
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// The client's correlation id, if it sent a valid one.
pub(crate) fn correlation_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}
