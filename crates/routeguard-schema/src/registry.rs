//! # Forward-Reference Registry
//!
//! Mutually recursive schemas (a `Cat` with an `owner: User`, a `User` with
//! `pets: [Cat]`) cannot be written as plain values: each needs the other to
//! exist first. The registry breaks the cycle with indirection.
//!
//! 1. [`SchemaRegistry::declare`] reserves a [`SchemaHandle`] by name.
//! 2. Schemas embed [`forward_ref`] markers naming handles.
//! 3. [`SchemaRegistry::define`] fills each handle, in any order.
//!
//! The compiler freezes the registry. A deferred marker is only followed
//! when validation reaches it, so the graph is never expanded and recursion
//! depth is bounded by the data.
//!
//! ## Marker Format
//!
//! `{"forwardRef": 3}` defers to handle 3. `{"forwardRef": {..schema..}}`
//! wraps a literal schema that is evaluated as a nested pass.

use std::collections::BTreeSet;

use routeguard_core::SchemaFragment;
use serde_json::{Map, Value};

use crate::error::CompileError;

/// Keyword that marks a forward reference.
pub const FORWARD_REF: &str = "forwardRef";

/// Index of a declared schema in a [`SchemaRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaHandle(usize);

impl SchemaHandle {
    /// Position in the registry.
    pub fn index(&self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_index(index: usize) -> Self {
        Self(index)
    }
}

/// Target of a parsed forward-reference marker.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaRef {
    /// Literal schema carried by the marker.
    Inline(Value),
    /// Registry schema resolved at validation time.
    Deferred(SchemaHandle),
}

impl SchemaRef {
    /// Parse `value` as a marker.
    ///
    /// Returns `None` when `value` is not a marker at all, and `Some(Err)`
    /// when it is one but is malformed.
    pub fn from_marker(value: &Value) -> Option<Result<SchemaRef, String>> {
        let obj = value.as_object()?;
        let target = obj.get(FORWARD_REF)?;
        if obj.len() > 1 {
            return Some(Err(format!(
                "a {FORWARD_REF} marker must not carry other keywords"
            )));
        }
        Some(match target {
            Value::Number(n) => match n.as_u64() {
                Some(index) => Ok(SchemaRef::Deferred(SchemaHandle(index as usize))),
                None => Err(format!("{FORWARD_REF} handle must be a non-negative integer")),
            },
            Value::Object(_) | Value::Bool(_) => Ok(SchemaRef::Inline(target.clone())),
            _ => Err(format!(
                "{FORWARD_REF} must name a handle or carry a schema"
            )),
        })
    }
}

/// Marker deferring to a registry schema.
pub fn forward_ref(handle: SchemaHandle) -> Value {
    marker(Value::from(handle.0))
}

/// Marker wrapping a literal schema.
pub fn inline_ref(schema: impl Into<Value>) -> Value {
    marker(schema.into())
}

fn marker(target: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(FORWARD_REF.to_string(), target);
    Value::Object(obj)
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    schema: Option<SchemaFragment>,
}

/// Named schemas that may reference each other through markers.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<Entry>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a handle for `name`. Declaring an existing name returns its
    /// handle.
    pub fn declare(&mut self, name: impl Into<String>) -> SchemaHandle {
        let name = name.into();
        if let Some(handle) = self.lookup(&name) {
            return handle;
        }
        self.entries.push(Entry { name, schema: None });
        SchemaHandle(self.entries.len() - 1)
    }

    /// Fill a declared handle.
    pub fn define(&mut self, handle: SchemaHandle, schema: SchemaFragment) -> Result<(), CompileError> {
        let entry = self
            .entries
            .get_mut(handle.0)
            .ok_or(CompileError::UnknownHandle(handle.0))?;
        if entry.schema.is_some() {
            return Err(CompileError::AlreadyDefined {
                name: entry.name.clone(),
            });
        }
        entry.schema = Some(schema);
        Ok(())
    }

    /// Declare and define in one step.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schema: SchemaFragment,
    ) -> Result<SchemaHandle, CompileError> {
        let handle = self.declare(name);
        self.define(handle, schema)?;
        Ok(handle)
    }

    /// Find the handle declared for `name`.
    pub fn lookup(&self, name: &str) -> Option<SchemaHandle> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(SchemaHandle)
    }

    /// Name a handle was declared with.
    pub fn name(&self, handle: SchemaHandle) -> Option<&str> {
        self.entries.get(handle.0).map(|e| e.name.as_str())
    }

    /// Schema defined for a handle, if any.
    pub fn get(&self, handle: SchemaHandle) -> Option<&SchemaFragment> {
        self.entries.get(handle.0).and_then(|e| e.schema.as_ref())
    }

    /// Whether `handle` has been defined.
    pub fn is_defined(&self, handle: SchemaHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Handles referenced by deferred markers anywhere in the schema.
    pub fn dependencies(&self, handle: SchemaHandle) -> Vec<SchemaHandle> {
        let mut found = BTreeSet::new();
        if let Some(schema) = self.get(handle) {
            collect_deferred(schema.as_value(), &mut found);
        }
        found.into_iter().collect()
    }

    /// Iterate over `(handle, name)` pairs in declaration order.
    pub fn handles(&self) -> impl Iterator<Item = (SchemaHandle, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (SchemaHandle(i), e.name.as_str()))
    }

    /// Number of declared handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn collect_deferred(value: &Value, found: &mut BTreeSet<SchemaHandle>) {
    if let Some(Ok(SchemaRef::Deferred(handle))) = SchemaRef::from_marker(value) {
        found.insert(handle);
        return;
    }
    match value {
        Value::Object(obj) => obj.values().for_each(|v| collect_deferred(v, found)),
        Value::Array(items) => items.iter().for_each(|v| collect_deferred(v, found)),
        _ => {}
    }
}
