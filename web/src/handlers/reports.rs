//! Report CRUD and custom-report handlers.
//!
//! Each handler is a thin shell over one [`ReportLifecycle`] operation:
//!
//! | route | operation | success |
//! |-------|-----------|---------|
//! | `POST /reports` | `create` | 201 + report |
//! | `GET /reports?k=v` | `list` | 200 + reports |
//! | `GET /reports/{id}` | `get` | 200 + report, or 404 |
//! | `PUT /reports/{id}` | `update` | 200 + report, or 404 |
//! | `DELETE /reports/{id}` | `delete` | 200 + `{message, report}`, or 404 |
//! | `POST /reports/custom` | `generate_custom_report` | 200 + custom report |
//!
//! Handlers that resolve a single report also return its [`ReportId`] as a
//! response extension, so the request span can record it.
//!
//! [`ReportLifecycle`]: reporting_runtime::ReportLifecycle

use crate::error::AppError;
use crate::extractors::{CorrelationId, JsonPayload};
use crate::state::AppState;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use reporting_core::custom_report::{CustomReport, CustomReportRequest};
use reporting_core::report::{NewReport, Report, ReportFilter, ReportId, ReportPatch};
use serde::Serialize;
use std::collections::HashMap;

/// Body returned by `DELETE /reports/{id}`.
#[derive(Debug, Serialize)]
pub struct DeletedReport {
    /// Confirmation text
    pub message: &'static str,
    /// The report as it was before deletion
    pub report: Report,
}

/// `POST /reports`
///
/// # Errors
///
/// 422 for an invalid payload, 500 if the store fails.
pub async fn create_report(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    JsonPayload(payload): JsonPayload<NewReport>,
) -> Result<(StatusCode, Extension<ReportId>, Json<Report>), AppError> {
    let report = state.lifecycle.create(payload).await?;
    tracing::info!(%correlation_id, report_id = %report.id, "Report created");
    Ok((StatusCode::CREATED, Extension(report.id.clone()), Json(report)))
}

/// `GET /reports`
///
/// Query parameters become a [`ReportFilter`]: `reportType` and `status` are
/// matched directly, every other key as a string attribute.
///
/// # Errors
///
/// 500 if the store fails.
pub async fn list_reports(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Report>>, AppError> {
    let filter = ReportFilter::from_pairs(params);
    let reports = state.lifecycle.list(&filter).await?;
    Ok(Json(reports))
}

/// `GET /reports/{id}`
///
/// # Errors
///
/// 404 for an unknown id, 500 if the store fails.
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(Extension<ReportId>, Json<Report>), AppError> {
    let id = ReportId::new(id);
    let report = state
        .lifecycle
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Report", &id))?;
    Ok((Extension(id), Json(report)))
}

/// `PUT /reports/{id}`
///
/// # Errors
///
/// 404 for an unknown id, 422 for an invalid patch, 500 if the store fails.
pub async fn update_report(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<String>,
    JsonPayload(patch): JsonPayload<ReportPatch>,
) -> Result<(Extension<ReportId>, Json<Report>), AppError> {
    let id = ReportId::new(id);
    let report = state
        .lifecycle
        .update(&id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("Report", &id))?;
    tracing::info!(%correlation_id, report_id = %report.id, "Report updated");
    Ok((Extension(id), Json(report)))
}

/// `DELETE /reports/{id}`
///
/// # Errors
///
/// 404 for an unknown id, 500 if the store fails.
pub async fn delete_report(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<String>,
) -> Result<(Extension<ReportId>, Json<DeletedReport>), AppError> {
    let id = ReportId::new(id);
    let report = state
        .lifecycle
        .delete(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Report", &id))?;
    tracing::info!(%correlation_id, report_id = %report.id, "Report deleted");
    Ok((
        Extension(id),
        Json(DeletedReport {
            message: "Report deleted successfully",
            report,
        }),
    ))
}

/// `POST /reports/custom`
///
/// # Errors
///
/// 422 for a blank report type, 500 if the aggregation fails. An
/// unreachable sales peer is not an error.
pub async fn generate_custom_report(
    State(state): State<AppState>,
    JsonPayload(request): JsonPayload<CustomReportRequest>,
) -> Result<Json<CustomReport>, AppError> {
    let report = state.lifecycle.generate_custom_report(request).await?;
    Ok(Json(report))
}
