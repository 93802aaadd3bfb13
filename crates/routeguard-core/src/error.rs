//! # Load-Time Errors
//!
//! Structural errors raised while the schema table is parsed and compiled.
//! They are fatal: bootstrap aborts and the server never starts accepting
//! requests. None of them can surface while a request is being handled.

use thiserror::Error;

/// A malformed schema declaration detected during bootstrap.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The table handed in by the route-scanning collaborator is not a
    /// mapping of operations to schema declarations.
    #[error("fail loading schemas: {0}")]
    InvalidTable(String),

    /// A request-side slot holds something that is not a schema fragment.
    #[error("fail loading schemas: operation {operation} has an invalid {slot} schema: {reason}")]
    InvalidSchema {
        /// Operation whose declaration is malformed.
        operation: String,
        /// Slot name (`parameters`, `query`, `headers`, `body`, `responses/<code>`).
        slot: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// The `responses` slot is not a mapping of status codes to fragments.
    #[error("fail loading schemas: operation {operation} has invalid responses: {reason}")]
    InvalidResponses {
        /// Operation whose declaration is malformed.
        operation: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// A response key is neither a status code, a status class nor `default`.
    #[error("fail loading schemas: operation {operation} declares unknown status key '{key}'")]
    InvalidStatusKey {
        /// Operation whose declaration is malformed.
        operation: String,
        /// The offending key.
        key: String,
    },

    /// A fragment was well-formed JSON but could not be compiled.
    #[error("fail loading schemas: operation {operation} {slot} schema does not compile: {reason}")]
    Compile {
        /// Operation whose schema failed.
        operation: String,
        /// Slot name.
        slot: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// An API description document could not be explored.
    #[error("fail exploring api description: {0}")]
    Explore(String),
}
