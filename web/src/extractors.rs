//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`JsonPayload`]: a JSON body whose rejections become [`AppError`]s

use crate::error::AppError;
use crate::middleware::correlation_id_from;
use axum::{
    Json, async_trait,
    extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::request::Parts,
};
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Reads the id stored by [`correlate`](crate::middleware::correlate), then the
/// `X-Correlation-ID` header, and generates a new UUID v4 as a last resort.
///
/// # Example
///
/// ```ignore
/// async fn handler(correlation_id: CorrelationId) -> String {
///     format!("Request ID: {}", correlation_id.0)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }

        Ok(Self(
            correlation_id_from(&parts.headers).unwrap_or_else(Uuid::new_v4),
        ))
    }
}

/// JSON request body.
///
/// Behaves like [`axum::Json`], except that a body that is not valid JSON or
/// does not match `T` is answered with a 422 [`AppError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonPayload<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
