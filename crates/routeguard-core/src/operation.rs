//! # Operation Identity
//!
//! An operation is one route handler. The framework adapter describes the
//! route it matched with a [`RouteDescriptor`]; an [`OperationIdentity`]
//! turns that into the [`OperationId`] used as the sole lookup key.
//!
//! ## Correctness Invariant
//!
//! Load and lookup must derive identifiers with the same function. When they
//! disagree the resolver legitimately reports "no schema registered" and
//! validation is silently skipped. The composition root therefore owns one
//! identity instance and hands it to both sides.

use serde::{Deserialize, Serialize};

/// Opaque identifier of one route handler.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub String);

impl OperationId {
    /// Wrap an already-derived identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Access the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Route identity as supplied by the framework adapter.
///
/// `method` is stored upper-cased. `path` is the route template the router
/// matched (`/cats/{id}`), not the concrete request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// HTTP method, upper-cased.
    pub method: String,
    /// Route template.
    pub path: String,
}

impl RouteDescriptor {
    /// Describe a route. The method is normalized to upper case.
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Derivation of an [`OperationId`] from a route.
///
/// Closures of the shape `Fn(&RouteDescriptor) -> OperationId` implement
/// this trait, so deployments can inject their own scheme.
pub trait OperationIdentity: Send + Sync {
    /// Derive the lookup key for `route`.
    fn operation_id(&self, route: &RouteDescriptor) -> OperationId;
}

impl<F> OperationIdentity for F
where
    F: Fn(&RouteDescriptor) -> OperationId + Send + Sync,
{
    fn operation_id(&self, route: &RouteDescriptor) -> OperationId {
        self(route)
    }
}

/// Default identity: `"<METHOD> <path template>"`, e.g. `"POST /cats"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodPathIdentity;

impl OperationIdentity for MethodPathIdentity {
    fn operation_id(&self, route: &RouteDescriptor) -> OperationId {
        OperationId(route.to_string())
    }
}
