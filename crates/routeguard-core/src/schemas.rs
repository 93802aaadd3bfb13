//! # Schema Declarations
//!
//! The raw, uncompiled schema table handed in at bootstrap. Shapes are
//! checked once here so that downstream code works with typed slots:
//! a fragment is always an object or boolean schema, and `responses` is
//! always a mapping of status keys to optional fragments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LoadError;
use crate::operation::{OperationId, OperationIdentity, RouteDescriptor};
use crate::result::RequestSlot;

/// A JSON-Schema document: an object or a boolean schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct SchemaFragment(Value);

impl SchemaFragment {
    /// Borrow the underlying JSON document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the underlying JSON document.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl TryFrom<Value> for SchemaFragment {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(_) | Value::Bool(_) => Ok(Self(value)),
            other => Err(format!(
                "expected an object or boolean schema, found {}",
                json_type(&other)
            )),
        }
    }
}

impl From<SchemaFragment> for Value {
    fn from(fragment: SchemaFragment) -> Self {
        fragment.0
    }
}

/// Uncompiled per-operation schema declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSchemas {
    /// Path parameters schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<SchemaFragment>,
    /// Query string schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<SchemaFragment>,
    /// Request headers schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<SchemaFragment>,
    /// Request body schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<SchemaFragment>,
    /// Response body schemas keyed by status key (`"200"`, `"2XX"`, `"default"`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, Option<SchemaFragment>>,
}

impl OperationSchemas {
    /// Parse the JSON form of one operation's declarations.
    ///
    /// `null` and missing slots are absent. Anything else that is not an
    /// object or boolean is an [`LoadError::InvalidSchema`] naming `operation`.
    pub fn from_json(operation: &str, value: &Value) -> Result<Self, LoadError> {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(LoadError::InvalidTable(format!(
                    "operation {operation} must map to an object, found {}",
                    json_type(other)
                )))
            }
        };

        let mut schemas = Self::default();
        for slot in RequestSlot::ALL {
            let fragment = optional_fragment(operation, slot.as_str(), obj.get(slot.as_str()))?;
            *schemas.slot_mut(slot) = fragment;
        }

        match obj.get("responses") {
            None | Some(Value::Null) => {}
            Some(Value::Object(responses)) => {
                for (status, raw) in responses {
                    let slot = format!("responses/{status}");
                    let fragment = optional_fragment(operation, &slot, Some(raw))?;
                    schemas.responses.insert(status.clone(), fragment);
                }
            }
            Some(other) => {
                return Err(LoadError::InvalidResponses {
                    operation: operation.to_string(),
                    reason: format!("expected an object, found {}", json_type(other)),
                })
            }
        }

        Ok(schemas)
    }

    /// Borrow the fragment declared for a request slot.
    pub fn slot(&self, slot: RequestSlot) -> Option<&SchemaFragment> {
        match slot {
            RequestSlot::Parameters => self.parameters.as_ref(),
            RequestSlot::Query => self.query.as_ref(),
            RequestSlot::Headers => self.headers.as_ref(),
            RequestSlot::Body => self.body.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: RequestSlot) -> &mut Option<SchemaFragment> {
        match slot {
            RequestSlot::Parameters => &mut self.parameters,
            RequestSlot::Query => &mut self.query,
            RequestSlot::Headers => &mut self.headers,
            RequestSlot::Body => &mut self.body,
        }
    }

    /// Builder-style setter for a request slot.
    pub fn with_slot(mut self, slot: RequestSlot, fragment: SchemaFragment) -> Self {
        *self.slot_mut(slot) = Some(fragment);
        self
    }

    /// Builder-style setter for a response status key.
    pub fn with_response(mut self, status: impl Into<String>, fragment: SchemaFragment) -> Self {
        self.responses.insert(status.into(), Some(fragment));
        self
    }
}

fn optional_fragment(
    operation: &str,
    slot: &str,
    raw: Option<&Value>,
) -> Result<Option<SchemaFragment>, LoadError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(value) => SchemaFragment::try_from(value.clone())
            .map(Some)
            .map_err(|reason| LoadError::InvalidSchema {
                operation: operation.to_string(),
                slot: slot.to_string(),
                reason,
            }),
    }
}

/// Uncompiled declarations for every operation, keyed by [`OperationId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaTable(pub BTreeMap<OperationId, OperationSchemas>);

impl SchemaTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an object of operation id → declarations.
    pub fn from_json(value: &Value) -> Result<Self, LoadError> {
        let obj: &Map<String, Value> = value.as_object().ok_or_else(|| {
            LoadError::InvalidTable(format!(
                "schema table must be an object, found {}",
                json_type(value)
            ))
        })?;
        let mut table = Self::new();
        for (operation, raw) in obj {
            let schemas = OperationSchemas::from_json(operation, raw)?;
            table.insert(OperationId::new(operation.clone()), schemas);
        }
        Ok(table)
    }

    /// Insert or replace one operation's declarations.
    pub fn insert(&mut self, id: OperationId, schemas: OperationSchemas) {
        self.0.insert(id, schemas);
    }

    /// Iterate over operations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&OperationId, &OperationSchemas)> {
        self.0.iter()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Declarations keyed by route rather than by operation id.
///
/// Produced by route declaration or by exploring an API description, before
/// an [`OperationIdentity`] has been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTable(pub Vec<(RouteDescriptor, OperationSchemas)>);

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one route's declarations.
    pub fn push(&mut self, route: RouteDescriptor, schemas: OperationSchemas) {
        self.0.push((route, schemas));
    }

    /// Builder-style [`push`](Self::push).
    pub fn route(mut self, route: RouteDescriptor, schemas: OperationSchemas) -> Self {
        self.push(route, schemas);
        self
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derive operation ids with `identity`. Later routes win on collision.
    pub fn into_schema_table(self, identity: &dyn OperationIdentity) -> SchemaTable {
        let mut table = SchemaTable::new();
        for (route, schemas) in self.0 {
            table.insert(identity.operation_id(&route), schemas);
        }
        table
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::MethodPathIdentity;
    use serde_json::json;

    fn fragment(value: Value) -> SchemaFragment {
        SchemaFragment::try_from(value).unwrap()
    }

    #[test]
    fn fragment_accepts_objects_and_booleans() {
        assert!(SchemaFragment::try_from(json!({"type": "string"})).is_ok());
        assert!(SchemaFragment::try_from(json!(true)).is_ok());
        assert!(SchemaFragment::try_from(json!("string")).is_err());
        assert!(SchemaFragment::try_from(json!(42)).is_err());
    }

    #[test]
    fn fragment_deserialize_rejects_non_schema() {
        let err = serde_json::from_value::<SchemaFragment>(json!([1])).unwrap_err();
        assert!(err.to_string().contains("found array"));
    }

    #[test]
    fn parses_operation_slots() {
        let schemas = OperationSchemas::from_json(
            "POST /cats",
            &json!({
                "body": {"type": "object"},
                "query": null,
                "responses": {"201": {"type": "object"}, "204": null}
            }),
        )
        .unwrap();
        assert!(schemas.body.is_some());
        assert!(schemas.query.is_none());
        assert!(schemas.parameters.is_none());
        assert_eq!(schemas.responses.len(), 2);
        assert!(schemas.responses["201"].is_some());
        assert!(schemas.responses["204"].is_none());
    }

    #[test]
    fn invalid_slot_names_operation() {
        let err = OperationSchemas::from_json("GET /cats", &json!({"headers": "x"})).unwrap_err();
        match err {
            LoadError::InvalidSchema { operation, slot, .. } => {
                assert_eq!(operation, "GET /cats");
                assert_eq!(slot, "headers");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_response_mapping() {
        let err = OperationSchemas::from_json("GET /cats", &json!({"responses": [1]})).unwrap_err();
        assert!(matches!(err, LoadError::InvalidResponses { .. }));

        let err =
            OperationSchemas::from_json("GET /cats", &json!({"responses": {"200": 3}})).unwrap_err();
        match err {
            LoadError::InvalidSchema { slot, .. } => assert_eq!(slot, "responses/200"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn table_from_json() {
        let table = SchemaTable::from_json(&json!({
            "GET /cats": {"query": {"type": "object"}},
            "POST /cats": {}
        }))
        .unwrap();
        assert_eq!(table.len(), 2);
        assert!(SchemaTable::from_json(&json!([])).is_err());
    }

    #[test]
    fn route_table_applies_identity() {
        let routes = RouteTable::new()
            .route(
                RouteDescriptor::new("post", "/cats"),
                OperationSchemas::default().with_slot(RequestSlot::Body, fragment(json!(true))),
            )
            .route(RouteDescriptor::new("get", "/cats/{id}"), OperationSchemas::default());
        let table = routes.into_schema_table(&MethodPathIdentity);
        let ids: Vec<&str> = table.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["GET /cats/{id}", "POST /cats"]);
    }
}
