//! # Validation Results
//!
//! [`ValidatorResult`] separates three outcomes that must never be
//! conflated: no contract existed (`validated == false`), a contract existed
//! and the data satisfied it, and a contract existed and was violated.

use serde::{Deserialize, Serialize};

/// One of the four request-side validation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSlot {
    /// Path parameters.
    Parameters,
    /// Query string.
    Query,
    /// Request headers.
    Headers,
    /// JSON request body.
    Body,
}

impl RequestSlot {
    /// All request slots, in the order the interceptor evaluates them.
    pub const ALL: [RequestSlot; 4] = [
        RequestSlot::Parameters,
        RequestSlot::Query,
        RequestSlot::Headers,
        RequestSlot::Body,
    ];

    /// Return the slot name used in schema tables and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parameters => "parameters",
            Self::Query => "query",
            Self::Headers => "headers",
            Self::Body => "body",
        }
    }
}

impl std::fmt::Display for RequestSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Human-readable description.
    pub message: String,
    /// JSON Pointer to the offending value in the instance. Empty for the root.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_path: String,
    /// JSON Pointer to the schema keyword that rejected the value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_path: String,
}

impl FieldError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            instance_path: String::new(),
            schema_path: String::new(),
        }
    }

    /// Attach the instance and schema locations.
    pub fn at(mut self, instance_path: impl Into<String>, schema_path: impl Into<String>) -> Self {
        self.instance_path = instance_path.into();
        self.schema_path = schema_path.into();
        self
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

/// Outcome of applying one compiled validator to one piece of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorResult {
    /// `false` only when a contract existed and was violated.
    pub success: bool,
    /// `false` when no schema was registered, so nothing was checked.
    pub validated: bool,
    /// Field errors, empty on success.
    pub errors: Vec<FieldError>,
}

impl ValidatorResult {
    /// No contract was registered for the slot.
    pub fn not_validated() -> Self {
        Self {
            success: true,
            validated: false,
            errors: Vec::new(),
        }
    }

    /// A contract existed and the data satisfied it.
    pub fn passed() -> Self {
        Self {
            success: true,
            validated: true,
            errors: Vec::new(),
        }
    }

    /// A contract existed and the data violated it.
    pub fn failed(errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            validated: true,
            errors,
        }
    }

    /// Build from a list of errors: empty means passed.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if errors.is_empty() {
            Self::passed()
        } else {
            Self::failed(errors)
        }
    }

    /// Join all error messages into one summary line.
    pub fn errors_text(&self) -> String {
        errors_text(&self.errors)
    }
}

/// Join error messages the way they are reported in exception summaries:
/// `"<path> <message>, <path> <message>"`.
pub fn errors_text(errors: &[FieldError]) -> String {
    if errors.is_empty() {
        return "No errors".to_string();
    }
    errors
        .iter()
        .map(|e| {
            if e.instance_path.is_empty() {
                e.message.clone()
            } else {
                format!("{} {}", e.instance_path, e.message)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
