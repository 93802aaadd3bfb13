//! # Validated Extractors
//!
//! The middleware stores the normalized slot values as a [`ValidatedRequest`]
//! extension. The request body is also rewritten, so `axum::Json` sees the
//! normalized body, but path parameters, query and headers are only
//! available in normalized form through these extractors.
//!
//! All of them require the validation middleware on the route and a schema
//! for the operation; otherwise they reject with [`AppError::Internal`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use routeguard_core::OperationId;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;
use crate::interceptor::RequestReport;

/// Normalized request slots of the current request.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Operation the request was routed to.
    pub operation: OperationId,
    pub parameters: Value,
    pub query: Value,
    pub headers: Value,
    pub body: Value,
    /// Per-slot validation results.
    pub report: RequestReport,
}

impl<S> FromRequestParts<S> for ValidatedRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ValidatedRequest>().cloned().ok_or_else(|| {
            AppError::Internal("validation middleware did not run for this route".to_string())
        })
    }
}

fn deserialize_slot<T: DeserializeOwned>(
    parts: &Parts,
    slot: &str,
    pick: fn(&ValidatedRequest) -> &Value,
) -> Result<T, AppError> {
    let validated = parts.extensions.get::<ValidatedRequest>().ok_or_else(|| {
        AppError::Internal("validation middleware did not run for this route".to_string())
    })?;
    serde_json::from_value(pick(validated).clone())
        .map_err(|e| AppError::BadRequest(format!("invalid {slot}: {e}")))
}

/// Normalized path parameters, deserialized into `T`.
#[derive(Debug, Clone)]
pub struct ValidatedParams<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        deserialize_slot(parts, "path parameters", |v| &v.parameters).map(Self)
    }
}

/// Normalized query string, deserialized into `T`.
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        deserialize_slot(parts, "query", |v| &v.query).map(Self)
    }
}

/// Normalized headers, deserialized into `T`. Keys are lower-case.
#[derive(Debug, Clone)]
pub struct ValidatedHeaders<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedHeaders<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        deserialize_slot(parts, "headers", |v| &v.headers).map(Self)
    }
}

/// Normalized body, deserialized into `T`.
///
/// Reads the extension rather than the body stream, so it can be combined
/// with other extractors in any order.
#[derive(Debug, Clone)]
pub struct ValidatedBody<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        deserialize_slot(parts, "body", |v| &v.body).map(Self)
    }
}
