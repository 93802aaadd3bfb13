//! # Validation Context Resolver
//!
//! Maps `(kind, operation)` to a compiled artifact. A missing operation or
//! slot is not an error: the interceptor simply does not validate it.

use routeguard_core::{OperationId, RequestSlot};
use routeguard_schema::CompiledValidator;

use crate::repository::{ResponseSlot, SchemaRepository};

/// Read-only view over the loaded [`SchemaRepository`].
#[derive(Debug, Clone)]
pub struct ValidationContext {
    repository: SchemaRepository,
}

impl ValidationContext {
    /// Wrap a fully loaded repository.
    pub fn new(repository: SchemaRepository) -> Self {
        Self { repository }
    }

    /// Validator for a request slot of `operation`.
    pub fn resolve_request_validator(
        &self,
        slot: RequestSlot,
        operation: &OperationId,
    ) -> Option<&CompiledValidator> {
        let Some(entry) = self.repository.get(operation) else {
            tracing::debug!(%operation, slot = slot.as_str(), "no schemas for operation");
            return None;
        };
        entry.request(slot)
    }

    /// Response artifact of `operation` for `status`.
    pub fn resolve_response_validator(
        &self,
        status: u16,
        operation: &OperationId,
    ) -> Option<&ResponseSlot> {
        let resolved = self.repository.get(operation).and_then(|e| e.response(status));
        if resolved.is_none() {
            tracing::debug!(%operation, status, "no response schema, passing through");
        }
        resolved
    }

    /// Whether any schema is loaded for `operation`.
    pub fn has_operation(&self, operation: &OperationId) -> bool {
        self.repository.get(operation).is_some()
    }

    /// Whether `operation` declares a body schema.
    pub fn has_body_schema(&self, operation: &OperationId) -> bool {
        self.repository
            .get(operation)
            .is_some_and(|e| e.body.is_some())
    }

    /// Whether `operation` declares any response schema.
    pub fn has_response_schemas(&self, operation: &OperationId) -> bool {
        self.repository
            .get(operation)
            .is_some_and(|e| e.has_responses())
    }

    /// The underlying repository.
    pub fn repository(&self) -> &SchemaRepository {
        &self.repository
    }
}
