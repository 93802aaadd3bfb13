//! # routeguard-core: Foundational Types
//!
//! Leaf crate of the routeguard workspace. Defines the vocabulary shared by
//! the schema compiler and the request pipeline.
//!
//! ## Key Types
//!
//! - [`OperationId`]: opaque lookup key for one route handler, derived from a
//!   [`RouteDescriptor`] by an injectable [`OperationIdentity`]. Load and
//!   lookup must use the same identity instance or entries never match.
//! - [`SchemaFragment`] / [`OperationSchemas`] / [`SchemaTable`]: the raw
//!   per-route schema declarations handed in at bootstrap. Slot shapes are
//!   decided here, at the boundary, and never re-sniffed downstream.
//! - [`ValidatorResult`] / [`FieldError`]: outcome of applying one compiled
//!   validator. `validated == false` means no contract existed for the slot.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `routeguard-*` crates.
//! - No `unsafe` code, no `.unwrap()` outside tests.

pub mod error;
pub mod operation;
pub mod result;
pub mod schemas;

pub use error::LoadError;
pub use operation::{MethodPathIdentity, OperationId, OperationIdentity, RouteDescriptor};
pub use result::{FieldError, RequestSlot, ValidatorResult};
pub use schemas::{OperationSchemas, RouteTable, SchemaFragment, SchemaTable};
