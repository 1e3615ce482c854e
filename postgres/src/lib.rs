//! `PostgreSQL` primary store for the reporting write path.
//!
//! [`PostgresReportStore`] implements the `ReportStore` port from
//! `reporting-core` on a single `reports` table (see `migrations/`). It uses
//! runtime-checked sqlx queries, so building the crate does not need a live
//! database.
//!
//! - Ids are UUID v4 strings assigned on insert.
//! - `update_by_id` locks the row with `SELECT ... FOR UPDATE` inside a
//!   transaction, applies the patch in Rust, and writes it back.
//! - `delete_by_id` is a single `DELETE ... RETURNING`.
//! - Attribute predicates compare JSONB values for exact equality.
//!
//! # Example
//!
//! ```no_run
//! use reporting_postgres::PostgresReportStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresReportStore::new("postgres://localhost/reports").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use reporting_core::report::{
    AggregateQuery, Attributes, DateRange, NewReport, Report, ReportFilter, ReportId,
    ReportPatch, SortOrder,
};
use reporting_core::store::{ReportStore, StoreError, StoreFuture};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, report_type, report_name, attributes, date_range_start, \
                       date_range_end, status, created_at, updated_at";

/// `PostgreSQL`-backed [`ReportStore`].
#[derive(Clone, Debug)]
pub struct PostgresReportStore {
    pool: PgPool,
}

impl PostgresReportStore {
    /// Connect with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailed`] if the database is unreachable.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        Self::connect(database_url, 10).await
    }

    /// Connect with at most `max_connections` pooled connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailed`] if the database is unreachable.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("Failed to connect: {e}")))?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QueryFailed`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Failed to run migrations: {e}")))?;
        tracing::info!("Report migrations applied");
        Ok(())
    }
}

/// Map a sqlx error into the port's error type.
fn store_error(action: &str, error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::ConnectionFailed(format!("Failed to {action}: {error}"))
        }
        sqlx::Error::Database(ref db) if !matches!(db.kind(), sqlx::error::ErrorKind::Other) => {
            StoreError::WriteRejected(format!("Failed to {action}: {error}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Serialization(format!("Failed to {action}: {error}"))
        }
        _ => StoreError::QueryFailed(format!("Failed to {action}: {error}")),
    }
}

fn row_to_report(row: &PgRow) -> Result<Report, StoreError> {
    let decode = |e: sqlx::Error| store_error("decode report row", e);

    let start: Option<DateTime<Utc>> = row.try_get("date_range_start").map_err(decode)?;
    let end: Option<DateTime<Utc>> = row.try_get("date_range_end").map_err(decode)?;
    let date_range = match (start, end) {
        (Some(start), Some(end)) => Some(
            DateRange::new(start, end).map_err(|e| StoreError::Serialization(e.to_string()))?,
        ),
        _ => None,
    };
    let Json(attributes): Json<Attributes> = row.try_get("attributes").map_err(decode)?;

    Ok(Report {
        id: ReportId::new(row.try_get::<String, _>("id").map_err(decode)?),
        report_type: row.try_get("report_type").map_err(decode)?,
        report_name: row.try_get("report_name").map_err(decode)?,
        attributes,
        date_range,
        status: row.try_get("status").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

/// Append `WHERE` predicates for `filter`. The report type is skipped when
/// `skip_report_type` is set, because the caller already constrained it.
fn push_filter<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    filter: &'a ReportFilter,
    skip_report_type: bool,
) {
    if !skip_report_type {
        if let Some(report_type) = &filter.report_type {
            builder.push(" AND report_type = ").push_bind(report_type.as_str());
        }
    }
    if let Some(status) = &filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    for (key, value) in &filter.attributes {
        builder
            .push(" AND attributes -> ")
            .push_bind(key.as_str())
            .push(" = ")
            .push_bind(Json(value));
    }
}

impl ReportStore for PostgresReportStore {
    fn insert(&self, report: NewReport, now: DateTime<Utc>) -> StoreFuture<'_, Report> {
        Box::pin(async move {
            let report = report.into_report(ReportId::new(Uuid::new_v4().to_string()), now);

            sqlx::query(
                r"
                INSERT INTO reports (
                    id, report_type, report_name, attributes,
                    date_range_start, date_range_end, status, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(report.id.as_str())
            .bind(&report.report_type)
            .bind(report.report_name.as_deref())
            .bind(Json(&report.attributes))
            .bind(report.date_range.map(|r| r.start()))
            .bind(report.date_range.map(|r| r.end()))
            .bind(report.status.as_deref())
            .bind(report.created_at)
            .bind(report.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("insert report", e))?;

            tracing::debug!(report_id = %report.id, "Inserted report row");
            Ok(report)
        })
    }

    fn find_by_id(&self, id: &ReportId) -> StoreFuture<'_, Option<Report>> {
        let id = id.clone();
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {COLUMNS} FROM reports WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| store_error("load report", e))?;
            row.as_ref().map(row_to_report).transpose()
        })
    }

    fn find(&self, filter: &ReportFilter) -> StoreFuture<'_, Vec<Report>> {
        let filter = filter.clone();
        Box::pin(async move {
            let mut builder = QueryBuilder::new(format!("SELECT {COLUMNS} FROM reports WHERE TRUE"));
            push_filter(&mut builder, &filter, false);
            builder.push(" ORDER BY seq ASC");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| store_error("query reports", e))?;
            rows.iter().map(row_to_report).collect()
        })
    }

    fn update_by_id(
        &self,
        id: &ReportId,
        patch: ReportPatch,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Report>> {
        let id = id.clone();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| store_error("begin transaction", e))?;

            let row = sqlx::query(&format!(
                "SELECT {COLUMNS} FROM reports WHERE id = $1 FOR UPDATE"
            ))
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| store_error("lock report", e))?;

            let Some(row) = row else {
                tx.rollback()
                    .await
                    .map_err(|e| store_error("roll back transaction", e))?;
                return Ok(None);
            };

            let mut report = row_to_report(&row)?;
            patch.apply_to(&mut report, now);

            sqlx::query(
                r"
                UPDATE reports SET
                    report_type = $2,
                    report_name = $3,
                    attributes = $4,
                    date_range_start = $5,
                    date_range_end = $6,
                    status = $7,
                    updated_at = $8
                WHERE id = $1
                ",
            )
            .bind(report.id.as_str())
            .bind(&report.report_type)
            .bind(report.report_name.as_deref())
            .bind(Json(&report.attributes))
            .bind(report.date_range.map(|r| r.start()))
            .bind(report.date_range.map(|r| r.end()))
            .bind(report.status.as_deref())
            .bind(report.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("update report", e))?;

            tx.commit()
                .await
                .map_err(|e| store_error("commit transaction", e))?;

            tracing::debug!(report_id = %report.id, "Updated report row");
            Ok(Some(report))
        })
    }

    fn delete_by_id(&self, id: &ReportId) -> StoreFuture<'_, Option<Report>> {
        let id = id.clone();
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "DELETE FROM reports WHERE id = $1 RETURNING {COLUMNS}"
            ))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("delete report", e))?;
            row.as_ref().map(row_to_report).transpose()
        })
    }

    fn aggregate(&self, query: &AggregateQuery) -> StoreFuture<'_, Vec<Report>> {
        let query = query.clone();
        Box::pin(async move {
            let mut builder = QueryBuilder::new(format!("SELECT {COLUMNS} FROM reports WHERE report_type = "));
            builder.push_bind(query.report_type.as_str());
            push_filter(&mut builder, &query.filter, true);
            builder.push(match query.sort {
                SortOrder::CreatedAtDesc => " ORDER BY created_at DESC, seq ASC",
                SortOrder::CreatedAtAsc => " ORDER BY created_at ASC, seq ASC",
            });

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| store_error("aggregate reports", e))?;
            rows.iter().map(row_to_report).collect()
        })
    }
}
