//! # Error Translation
//!
//! The interceptor never decides how a violation is reported. It raises a
//! [`ValidationException`] and hands it to the configured
//! [`ValidationErrorHandler`], which either produces the client-facing
//! [`ValidationError`] or lets the request continue.

use crate::error::{ValidationError, ValidationException, ValidationPhase};

/// Translates interceptor exceptions into client-facing errors.
pub trait ValidationErrorHandler: Send + Sync {
    /// `Err` aborts the request with the returned error. `Ok` lets the
    /// pipeline continue with the (normalized) data.
    fn handle(&self, exception: ValidationException) -> Result<(), ValidationError>;
}

/// Default handler: reject with the first error's message.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingErrorHandler;

impl ValidationErrorHandler for RejectingErrorHandler {
    fn handle(&self, exception: ValidationException) -> Result<(), ValidationError> {
        let message = exception
            .errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| exception.errors_text.clone());
        Err(ValidationError::new(
            message,
            exception.phase,
            exception.errors,
            exception.original_data,
        ))
    }
}

/// Report-only handler: log the violation and let the request through.
///
/// Useful while rolling contracts out against live traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ValidationErrorHandler for LoggingErrorHandler {
    fn handle(&self, exception: ValidationException) -> Result<(), ValidationError> {
        match exception.phase {
            ValidationPhase::Request => tracing::warn!(
                operation = %exception.operation,
                slot = exception.slot.map(|s| s.as_str()).unwrap_or("-"),
                errors = %exception.errors_text,
                "request violates contract, continuing"
            ),
            ValidationPhase::Response => tracing::warn!(
                operation = %exception.operation,
                errors = %exception.errors_text,
                "response violates contract, continuing"
            ),
        }
        Ok(())
    }
}

impl<F> ValidationErrorHandler for F
where
    F: Fn(ValidationException) -> Result<(), ValidationError> + Send + Sync,
{
    fn handle(&self, exception: ValidationException) -> Result<(), ValidationError> {
        self(exception)
    }
}
