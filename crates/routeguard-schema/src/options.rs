//! Compiler options shared by every validator built by one engine.

use serde::{Deserialize, Serialize};

/// Behavior switches applied to all compiled validators.
///
/// Defaults mirror what request validation wants out of the box: lenient
/// keywords, aggressive normalization, and complete error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Reject unknown keywords at compile time.
    pub strict: bool,
    /// Drop properties the schema does not declare.
    pub remove_additional: bool,
    /// Fill absent properties from their `default`.
    pub use_defaults: bool,
    /// Convert primitives to the declared `type`.
    pub coerce_types: bool,
    /// Report every violation instead of the first.
    pub all_errors: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            strict: false,
            remove_additional: true,
            use_defaults: true,
            coerce_types: true,
            all_errors: true,
        }
    }
}
