//! Errors raised while compiling schemas and rendering responses.

use thiserror::Error;

/// A schema fragment could not be turned into a validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The fragment is not a valid schema.
    #[error("invalid schema at '{path}': {reason}")]
    InvalidSchema {
        /// JSON Pointer to the offending subschema.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Strict mode found a keyword it does not recognize.
    #[error("unknown keyword '{keyword}' at '{path}'")]
    UnknownKeyword {
        /// The unrecognized keyword.
        keyword: String,
        /// JSON Pointer to the schema object carrying it.
        path: String,
    },

    /// A marker points at a registry handle that was never defined.
    #[error("forward reference at '{path}' targets undefined schema #{handle}")]
    UndefinedReference {
        /// Handle index the marker names.
        handle: usize,
        /// JSON Pointer to the marker.
        path: String,
    },

    /// A registry handle does not belong to the registry it was used with.
    #[error("unknown schema handle #{0}")]
    UnknownHandle(usize),

    /// A registry handle was defined twice.
    #[error("schema '{name}' is already defined")]
    AlreadyDefined {
        /// Name the handle was declared with.
        name: String,
    },

    /// Registry schemas reference each other without consuming any data.
    #[error("schema '{name}' references itself at the same instance location")]
    ReferenceCycle {
        /// Name of a schema on the cycle.
        name: String,
    },
}

/// A response value could not be rendered by a compiled stringifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StringifyError {
    /// A required property is absent.
    #[error("'{property}' is required at '{path}'")]
    MissingRequired {
        /// JSON Pointer to the object.
        path: String,
        /// Missing property name.
        property: String,
    },

    /// A value could not be coerced to its declared type.
    #[error("value at '{path}' cannot be rendered as {expected}")]
    Coercion {
        /// JSON Pointer to the value.
        path: String,
        /// Declared type(s).
        expected: String,
    },

    /// JSON encoding failed.
    #[error("encoding failed: {0}")]
    Encode(String),
}
