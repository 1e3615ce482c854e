//! Axum HTTP surface for the reporting write path.
//!
//! The handlers only translate HTTP into [`ReportLifecycle`] calls and map
//! [`ReportError`]s to status codes. Write ordering and failure isolation
//! live in the lifecycle manager.
//!
//! # Routes
//!
//! ```text
//! POST   /reports            create           201 | 422 | 500
//! GET    /reports            list             200 | 500
//! POST   /reports/custom     generate         200 | 422 | 500
//! GET    /reports/{id}       get              200 | 404 | 500
//! PUT    /reports/{id}       update           200 | 404 | 422 | 500
//! DELETE /reports/{id}       delete           200 | 404 | 500
//! GET    /health             liveness         200
//! GET    /metrics            prometheus text  200 | 503
//! ```
//!
//! The report routes are also mounted under `/api/reports` for clients of
//! the previous service.
//!
//! # Example
//!
//! ```ignore
//! use reporting_web::{AppState, router};
//!
//! let app = router(AppState::new(lifecycle));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! [`ReportLifecycle`]: reporting_runtime::ReportLifecycle
//! [`ReportError`]: reporting_core::error::ReportError

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use extractors::{CorrelationId, JsonPayload};
pub use middleware::{CORRELATION_ID_HEADER, correlate};
pub use state::AppState;

/// Routes under `/reports`, relative to the mount point.
fn report_routes() -> Router<AppState> {
    use handlers::reports;

    Router::new()
        .route("/", post(reports::create_report).get(reports::list_reports))
        .route("/custom", post(reports::generate_custom_report))
        .route(
            "/:id",
            get(reports::get_report)
                .put(reports::update_report)
                .delete(reports::delete_report),
        )
}

/// Build the full application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/reports", report_routes())
        .nest("/api/reports", report_routes())
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(middleware::correlate))
        .with_state(state)
}
