//! # routeguard-schema: Schema Compilation
//!
//! Turns declarative schema fragments into executable validators and
//! stringifiers. The `jsonschema` crate is the evaluation primitive; this
//! crate adds what request validation needs on top of it.
//!
//! ## Compilation (`compiler`)
//!
//! [`SchemaCompiler`] owns the process-wide engine: the frozen
//! [`SchemaRegistry`] compiled once, plus the [`CompilerOptions`] every
//! validator shares. [`CompiledValidator::validate`] normalizes the value in
//! place (coercion, defaults, stripping of undeclared properties) and then
//! evaluates it.
//!
//! ## Forward References (`registry`)
//!
//! Schemas that reference each other are declared in the registry first and
//! defined afterwards. A `{"forwardRef": <handle>}` marker is resolved when
//! validation reaches it, so mutually recursive graphs never need to be
//! expanded at compile time.
//!
//! ## Crate Policy
//!
//! - Depends only on `routeguard-core` internally.
//! - Compilation is all-or-nothing: a fragment either yields a validator or a
//!   [`CompileError`], never a partially working one.
//! - Compiled artifacts are immutable and `Send + Sync`.

pub mod coerce;
pub mod compiler;
pub mod error;
mod keywords;
mod normalize;
pub mod options;
mod plan;
pub mod registry;
mod stringify;

pub use compiler::{CompiledStringifier, CompiledValidator, SchemaCompiler};
pub use error::{CompileError, StringifyError};
pub use options::CompilerOptions;
pub use registry::{forward_ref, inline_ref, SchemaHandle, SchemaRef, SchemaRegistry, FORWARD_REF};
