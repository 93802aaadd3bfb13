//! # Validation Interceptor
//!
//! Framework-agnostic core of the request pipeline. The axum middleware in
//! [`crate::middleware`] extracts the slot values, calls
//! [`before_handler`](ValidationInterceptor::before_handler), runs the route
//! handler, then calls [`after_handler`](ValidationInterceptor::after_handler)
//! on the response body.
//!
//! ## Before the handler
//!
//! Every slot is evaluated, in [`RequestSlot::ALL`] order. Unset validators
//! are skipped and recorded as not validated. Each value is normalized in
//! place. Each failing slot then raises its own [`ValidationException`]
//! through the error handler, in the same order; the first rejection is the
//! one returned.
//!
//! ## After the handler
//!
//! The response artifact is resolved by status code. A validator normalizes
//! the body in place. A stringifier renders it directly to JSON text, which
//! requires a transport that lets the interceptor set the content type. A
//! body the stringifier rejects is normalized instead if the error handler
//! lets it through, so undeclared fields never leave the server.

use std::collections::BTreeMap;
use std::sync::Arc;

use routeguard_core::{FieldError, OperationId, RequestSlot, ValidatorResult};
use serde::Serialize;
use serde_json::Value;

use crate::context::ValidationContext;
use crate::error::{ValidationError, ValidationException, ValidationPhase};
use crate::handler::ValidationErrorHandler;
use crate::repository::ResponseSlot;

/// The four request slot values of one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestData {
    pub parameters: Value,
    pub query: Value,
    pub headers: Value,
    pub body: Value,
}

impl RequestData {
    /// Borrow one slot value.
    pub fn slot(&self, slot: RequestSlot) -> &Value {
        match slot {
            RequestSlot::Parameters => &self.parameters,
            RequestSlot::Query => &self.query,
            RequestSlot::Headers => &self.headers,
            RequestSlot::Body => &self.body,
        }
    }

    /// Mutably borrow one slot value.
    pub fn slot_mut(&mut self, slot: RequestSlot) -> &mut Value {
        match slot {
            RequestSlot::Parameters => &mut self.parameters,
            RequestSlot::Query => &mut self.query,
            RequestSlot::Headers => &mut self.headers,
            RequestSlot::Body => &mut self.body,
        }
    }
}

/// Per-slot results of the before phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestReport {
    results: BTreeMap<RequestSlot, ValidatorResult>,
}

impl RequestReport {
    /// Result recorded for `slot`, if the slot was reached.
    pub fn get(&self, slot: RequestSlot) -> Option<&ValidatorResult> {
        self.results.get(&slot)
    }

    /// Whether every evaluated slot passed.
    pub fn success(&self) -> bool {
        self.results.values().all(|r| r.success)
    }

    /// Iterate over `(slot, result)` in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (RequestSlot, &ValidatorResult)> {
        self.results.iter().map(|(slot, result)| (*slot, result))
    }

    fn record(&mut self, slot: RequestSlot, result: ValidatorResult) {
        self.results.insert(slot, result);
    }
}

/// What the after phase did with a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// No schema for this status; the body is untouched.
    Passthrough(Value),
    /// The body was validated and normalized.
    Validated(Value),
    /// The body was rendered by a stringifier.
    Serialized(String),
}

/// Capabilities of the HTTP framework the interceptor is mounted on.
pub trait TransportAdapter: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the interceptor may set the response content type itself.
    fn supports_content_type_override(&self) -> bool;
}

/// The axum transport, see [`crate::middleware`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AxumTransport;

impl TransportAdapter for AxumTransport {
    fn name(&self) -> &'static str {
        "axum"
    }

    fn supports_content_type_override(&self) -> bool {
        true
    }
}

/// Runs the before and after phases for one operation.
#[derive(Clone)]
pub struct ValidationInterceptor {
    context: ValidationContext,
    error_handler: Arc<dyn ValidationErrorHandler>,
}

impl ValidationInterceptor {
    pub fn new(context: ValidationContext, error_handler: Arc<dyn ValidationErrorHandler>) -> Self {
        Self {
            context,
            error_handler,
        }
    }

    /// Resolver this interceptor reads from.
    pub fn context(&self) -> &ValidationContext {
        &self.context
    }

    /// Validate and normalize the request slots of `data` in place.
    pub fn before_handler(
        &self,
        operation: &OperationId,
        data: &mut RequestData,
    ) -> Result<RequestReport, ValidationError> {
        let mut report = RequestReport::default();
        let mut failures = Vec::new();
        for slot in RequestSlot::ALL {
            let Some(validator) = self.context.resolve_request_validator(slot, operation) else {
                report.record(slot, ValidatorResult::not_validated());
                continue;
            };

            let value = data.slot_mut(slot);
            let original = value.clone();
            let result = validator.validate(value);
            if !result.success {
                failures.push(ValidationException::new(
                    ValidationPhase::Request,
                    operation.clone(),
                    Some(slot),
                    result.errors.clone(),
                    original,
                ));
            }
            report.record(slot, result);
        }

        let mut rejection = None;
        for exception in failures {
            tracing::warn!(
                %operation,
                slot = exception.slot.map(|s| s.as_str()),
                phase = %ValidationPhase::Request,
                errors = %exception.errors_text,
                "request validation failed"
            );
            if let Err(e) = self.error_handler.handle(exception) {
                rejection.get_or_insert(e);
            }
        }
        match rejection {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Validate or serialize a response body produced by the handler.
    pub fn after_handler(
        &self,
        operation: &OperationId,
        status: u16,
        mut body: Value,
    ) -> Result<ResponseOutcome, ValidationError> {
        match self.context.resolve_response_validator(status, operation) {
            None => Ok(ResponseOutcome::Passthrough(body)),
            Some(ResponseSlot::Validator(validator)) => {
                let original = body.clone();
                let result = validator.validate(&mut body);
                if !result.success {
                    self.raise_response(operation, status, result.errors, original)?;
                }
                Ok(ResponseOutcome::Validated(body))
            }
            Some(ResponseSlot::Stringifier(stringifier)) => match stringifier.stringify(&body) {
                Ok(text) => Ok(ResponseOutcome::Serialized(text)),
                Err(e) => {
                    let errors = vec![FieldError::new(e.to_string())];
                    self.raise_response(operation, status, errors, body.clone())?;
                    stringifier.normalize(&mut body);
                    Ok(ResponseOutcome::Validated(body))
                }
            },
        }
    }

    /// Report a response body that a schema covers but that cannot be read
    /// as JSON. `Ok` means the error handler lets the raw body through.
    pub fn unreadable_response(
        &self,
        operation: &OperationId,
        status: u16,
        reason: impl Into<String>,
        original: Value,
    ) -> Result<(), ValidationError> {
        self.raise_response(operation, status, vec![FieldError::new(reason)], original)
    }

    fn raise_response(
        &self,
        operation: &OperationId,
        status: u16,
        errors: Vec<FieldError>,
        original: Value,
    ) -> Result<(), ValidationError> {
        let exception = ValidationException::new(
            ValidationPhase::Response,
            operation.clone(),
            None,
            errors,
            original,
        );
        // A handler that breaks its own contract is a server bug.
        tracing::error!(
            %operation,
            status,
            phase = %ValidationPhase::Response,
            errors = %exception.errors_text,
            "response validation failed"
        );
        self.error_handler.handle(exception)
    }
}

impl std::fmt::Debug for ValidationInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationInterceptor")
            .field("operations", &self.context.repository().len())
            .finish_non_exhaustive()
    }
}
