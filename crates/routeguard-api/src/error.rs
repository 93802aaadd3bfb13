//! # API Error Types
//!
//! Three families of errors leave this crate:
//!
//! - [`BootstrapError`]: fatal, raised while the validation module is built.
//! - [`ValidationException`] / [`ValidationError`]: a contract was violated.
//!   The interceptor raises the exception; the error handler translates it
//!   into the error that is rendered to the client.
//! - [`AppError`]: the adapter could not even get the data to validate
//!   (unreadable or oversized bodies). Internal details are never exposed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use routeguard_core::{FieldError, LoadError, OperationId, RequestSlot};
use routeguard_schema::CompileError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors during validation module bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A schema declaration was malformed or failed to compile.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The schema registry could not be compiled.
    #[error("fail compiling schema registry: {0}")]
    Registry(#[from] CompileError),

    /// Configuration could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fast serialization needs a transport that lets the interceptor set
    /// the response content type.
    #[error("fast serialization is not supported by the '{transport}' transport")]
    UnsupportedTransport {
        /// Transport adapter name.
        transport: &'static str,
    },
}

/// Pipeline stage at which a contract was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPhase {
    /// Inbound data violated the request contract.
    Request,
    /// The handler produced a response violating its contract.
    Response,
}

impl ValidationPhase {
    /// Name of the exception raised in this phase.
    pub fn exception_name(&self) -> &'static str {
        match self {
            Self::Request => "ValidationException",
            Self::Response => "ResponseValidationException",
        }
    }
}

impl std::fmt::Display for ValidationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// Raised by the interceptor when a validator reports failure.
#[derive(Debug, Clone, Error)]
#[error("{name}: {errors_text}")]
pub struct ValidationException {
    /// `ValidationException` or `ResponseValidationException`.
    pub name: &'static str,
    /// Where in the pipeline the violation happened.
    pub phase: ValidationPhase,
    /// Operation being served.
    pub operation: OperationId,
    /// Request slot that failed. `None` in the response phase.
    pub slot: Option<RequestSlot>,
    /// Field errors reported by the validator.
    pub errors: Vec<FieldError>,
    /// Joined summary of `errors`.
    pub errors_text: String,
    /// The data as it was before normalization.
    pub original_data: Value,
}

impl ValidationException {
    /// Build an exception for `phase`, deriving the name and summary.
    pub fn new(
        phase: ValidationPhase,
        operation: OperationId,
        slot: Option<RequestSlot>,
        errors: Vec<FieldError>,
        original_data: Value,
    ) -> Self {
        Self {
            name: phase.exception_name(),
            phase,
            operation,
            slot,
            errors_text: routeguard_core::result::errors_text(&errors),
            errors,
            original_data,
        }
    }
}

/// Client-facing validation failure produced by the error handler.
///
/// Renders as HTTP 500 `{"message": ...}` unless reshaped with
/// [`with_status`](Self::with_status) or
/// [`exposing_errors`](Self::exposing_errors).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Human-readable message: by default the first field error.
    pub message: String,
    /// Where in the pipeline the violation happened.
    pub phase: ValidationPhase,
    /// Full list of field errors.
    pub errors: Vec<FieldError>,
    /// The data as it was before normalization.
    pub original_data: Value,
    status: StatusCode,
    expose_errors: bool,
}

impl ValidationError {
    /// Error name reported to clients and logs.
    pub const NAME: &'static str = "ValidationError";

    /// Create an error that renders as 500 with only `message`.
    pub fn new(
        message: impl Into<String>,
        phase: ValidationPhase,
        errors: Vec<FieldError>,
        original_data: Value,
    ) -> Self {
        Self {
            message: message.into(),
            phase,
            errors,
            original_data,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            expose_errors: false,
        }
    }

    /// Override the response status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Include the field error list in the response body.
    pub fn exposing_errors(mut self) -> Self {
        self.expose_errors = true;
        self
    }

    /// Status the error renders with.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Error name, always [`Self::NAME`].
    pub fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let mut body = serde_json::Map::new();
        body.insert("message".to_string(), Value::String(self.message));
        if self.expose_errors {
            body.insert(
                "errors".to_string(),
                serde_json::to_value(&self.errors).unwrap_or(Value::Null),
            );
        }
        (self.status, Json(Value::Object(body))).into_response()
    }
}

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "PAYLOAD_TOO_LARGE").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Adapter-level failures that prevent validation from running.
#[derive(Error, Debug)]
pub enum AppError {
    /// The request body or query string cannot be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeds the configured limit (413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}
