//! # OpenAPI Route Exploration
//!
//! Derives a [`RouteTable`] from an OpenAPI 3 document.
//!
//! ## Component Schemas
//!
//! Every entry of `#/components/schemas` is declared in the
//! [`SchemaRegistry`] before any of them is defined, and each
//! `$ref: "#/components/schemas/<Name>"` is rewritten to a forward-reference
//! marker. Mutually recursive components therefore compile without being
//! expanded.
//!
//! `$ref`s to `#/components/parameters`, `#/components/requestBodies` and
//! `#/components/responses` are resolved in place. Any other `$ref` is an
//! error.
//!
//! ## OpenAPI-only keywords
//!
//! `nullable: true` widens `type` to include `"null"`. `example` becomes
//! `examples`. `discriminator`, `xml` and `externalDocs` are dropped.

use std::collections::HashMap;

use routeguard_core::{
    LoadError, OperationSchemas, RequestSlot, RouteDescriptor, RouteTable, SchemaFragment,
};
use routeguard_schema::{forward_ref, SchemaHandle, SchemaRegistry};
use serde_json::{json, Map, Value};

const METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];
const JSON_MEDIA_TYPE: &str = "application/json";
const SCHEMAS_PREFIX: &str = "#/components/schemas/";

/// Keywords whose values are JSON data, never schemas.
const DATA_KEYWORDS: &[&str] = &["default", "enum", "const", "examples", "required"];
/// Keywords whose values map names to schemas.
const SCHEMA_MAPS: &[&str] = &[
    "properties", "patternProperties", "$defs", "definitions", "dependentSchemas",
];
const DROPPED_KEYWORDS: &[&str] = &["discriminator", "xml", "externalDocs"];

/// `$ref` chains longer than this are treated as cycles.
const MAX_REF_DEPTH: usize = 16;

/// Explore a parsed OpenAPI 3 document.
///
/// Component schemas are added to `registry`; the returned routes reference
/// them through forward-reference markers.
pub fn explore(document: &Value, registry: &mut SchemaRegistry) -> Result<RouteTable, LoadError> {
    let Value::Object(root) = document else {
        return Err(explore_error("document must be an object"));
    };
    if let Some(version) = root.get("openapi") {
        match version.as_str() {
            Some(v) if v.starts_with('3') => {}
            _ => return Err(explore_error(format!("unsupported OpenAPI version {version}"))),
        }
    }

    let handles = register_components(document, registry)?;
    let explorer = Explorer { document, handles };

    let mut routes = RouteTable::new();
    let Some(paths) = root.get("paths") else {
        return Ok(routes);
    };
    let Value::Object(paths) = paths else {
        return Err(explore_error("paths must be an object"));
    };
    for (path, item) in paths {
        let item = explorer
            .resolve(item, "#/components/pathItems/")
            .map_err(|e| explore_error(format!("{path}: {e}")))?;
        let shared = item.get("parameters");
        for method in METHODS {
            let Some(operation) = item.get(*method) else {
                continue;
            };
            let schemas = explorer.operation(shared, operation).map_err(|e| {
                explore_error(format!("{} {path}: {e}", method.to_ascii_uppercase()))
            })?;
            routes.push(RouteDescriptor::new(method, path.clone()), schemas);
        }
    }

    tracing::debug!(
        routes = routes.len(),
        components = explorer.handles.len(),
        "api description explored"
    );
    Ok(routes)
}

/// Parse a YAML OpenAPI document and [`explore`] it.
pub fn explore_yaml(source: &str, registry: &mut SchemaRegistry) -> Result<RouteTable, LoadError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(source).map_err(|e| explore_error(format!("invalid YAML: {e}")))?;
    let document = yaml_document(yaml, "").map_err(explore_error)?;
    explore(&document, registry)
}

fn explore_error(message: impl Into<String>) -> LoadError {
    LoadError::Explore(message.into())
}

/// Two-phase registration: declare every name, then define every schema.
fn register_components(
    document: &Value,
    registry: &mut SchemaRegistry,
) -> Result<HashMap<String, SchemaHandle>, LoadError> {
    let components = match document.pointer("/components/schemas") {
        None | Some(Value::Null) => return Ok(HashMap::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(explore_error("components/schemas must be an object")),
    };

    let handles: HashMap<String, SchemaHandle> = components
        .keys()
        .map(|name| (name.clone(), registry.declare(name.as_str())))
        .collect();

    for (name, schema) in components {
        let rewritten = rewrite_schema(schema, &handles)
            .map_err(|e| explore_error(format!("component schema {name}: {e}")))?;
        let fragment = SchemaFragment::try_from(rewritten)
            .map_err(|e| explore_error(format!("component schema {name}: {e}")))?;
        registry
            .define(handles[name], fragment)
            .map_err(|e| explore_error(format!("component schema {name}: {e}")))?;
    }
    Ok(handles)
}

struct Explorer<'a> {
    document: &'a Value,
    handles: HashMap<String, SchemaHandle>,
}

impl<'a> Explorer<'a> {
    /// Follow `$ref`s into the component section named by `prefix`.
    fn resolve(&self, value: &'a Value, prefix: &str) -> Result<&'a Value, String> {
        let mut current = value;
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok(current);
            };
            if !reference.starts_with(prefix) {
                return Err(format!("unsupported $ref '{reference}'"));
            }
            current = self
                .document
                .pointer(&reference[1..])
                .ok_or_else(|| format!("unresolved $ref '{reference}'"))?;
        }
        Err(format!("$ref chain deeper than {MAX_REF_DEPTH}"))
    }

    fn operation(
        &self,
        shared: Option<&'a Value>,
        operation: &'a Value,
    ) -> Result<OperationSchemas, String> {
        let mut schemas = OperationSchemas::default();

        for (slot, schema) in self.parameters(shared, operation.get("parameters"))? {
            schemas = schemas.with_slot(slot, schema);
        }

        if let Some(body) = operation.get("requestBody") {
            let body = self.resolve(body, "#/components/requestBodies/")?;
            if let Some(schema) = self.media_schema(body)? {
                schemas = schemas.with_slot(RequestSlot::Body, schema);
            }
        }

        if let Some(responses) = operation.get("responses") {
            let Value::Object(responses) = responses else {
                return Err("responses must be an object".to_string());
            };
            for (status, response) in responses {
                let response = self.resolve(response, "#/components/responses/")?;
                if let Some(schema) = self.media_schema(response)? {
                    schemas = schemas.with_response(status.clone(), schema);
                }
            }
        }

        Ok(schemas)
    }

    /// Group path-level and operation-level parameters into one object
    /// schema per location. Operation-level entries override path-level
    /// ones with the same name and location.
    fn parameters(
        &self,
        shared: Option<&'a Value>,
        own: Option<&'a Value>,
    ) -> Result<Vec<(RequestSlot, SchemaFragment)>, String> {
        let mut merged: Vec<(String, String, &Value)> = Vec::new();
        for list in [shared, own].into_iter().flatten() {
            let Value::Array(list) = list else {
                return Err("parameters must be an array".to_string());
            };
            for parameter in list {
                let parameter = self.resolve(parameter, "#/components/parameters/")?;
                let name = parameter
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or("parameter without a name")?;
                let location = parameter
                    .get("in")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("parameter {name} without a location"))?;
                let name = if location == "header" {
                    name.to_ascii_lowercase()
                } else {
                    name.to_string()
                };
                merged.retain(|(n, l, _)| !(n == &name && l == location));
                merged.push((name, location.to_string(), parameter));
            }
        }

        let mut groups: Vec<(RequestSlot, Map<String, Value>, Vec<Value>)> = Vec::new();
        for (name, location, parameter) in merged {
            let slot = match location.as_str() {
                "path" => RequestSlot::Parameters,
                "query" => RequestSlot::Query,
                "header" => RequestSlot::Headers,
                "cookie" => continue,
                other => return Err(format!("parameter {name} has unknown location '{other}'")),
            };
            let schema = match parameter.get("schema") {
                Some(schema) => rewrite_schema(schema, &self.handles)?,
                None => Value::Bool(true),
            };
            let required = location == "path"
                || parameter.get("required").and_then(Value::as_bool).unwrap_or(false);

            let index = match groups.iter().position(|(s, _, _)| *s == slot) {
                Some(index) => index,
                None => {
                    groups.push((slot, Map::new(), Vec::new()));
                    groups.len() - 1
                }
            };
            let (_, properties, required_names) = &mut groups[index];
            properties.insert(name.clone(), schema);
            if required {
                required_names.push(Value::String(name));
            }
        }

        groups
            .into_iter()
            .map(|(slot, properties, required)| {
                let mut schema = json!({"type": "object", "properties": properties});
                if !required.is_empty() {
                    schema["required"] = Value::Array(required);
                }
                SchemaFragment::try_from(schema).map(|f| (slot, f))
            })
            .collect()
    }

    fn media_schema(&self, holder: &Value) -> Result<Option<SchemaFragment>, String> {
        let Some(schema) = holder
            .get("content")
            .and_then(|c| c.get(JSON_MEDIA_TYPE))
            .and_then(|m| m.get("schema"))
        else {
            return Ok(None);
        };
        let rewritten = rewrite_schema(schema, &self.handles)?;
        SchemaFragment::try_from(rewritten).map(Some)
    }
}

/// Rewrite component `$ref`s into forward-reference markers and translate
/// OpenAPI-only keywords.
fn rewrite_schema(schema: &Value, handles: &HashMap<String, SchemaHandle>) -> Result<Value, String> {
    let Value::Object(obj) = schema else {
        return Ok(schema.clone());
    };

    if let Some(reference) = obj.get("$ref") {
        let reference = reference.as_str().ok_or("$ref must be a string")?;
        let Some(encoded) = reference.strip_prefix(SCHEMAS_PREFIX) else {
            return Err(format!("unsupported $ref '{reference}'"));
        };
        let name = encoded.replace("~1", "/").replace("~0", "~");
        let handle = handles
            .get(&name)
            .ok_or_else(|| format!("unknown component schema '{name}'"))?;
        return Ok(forward_ref(*handle));
    }

    let mut out = Map::new();
    for (keyword, value) in obj {
        let keyword = keyword.as_str();
        if DROPPED_KEYWORDS.contains(&keyword) || keyword == "nullable" {
            continue;
        }
        if keyword == "example" {
            if !obj.contains_key("examples") {
                out.insert("examples".to_string(), Value::Array(vec![value.clone()]));
            }
            continue;
        }
        let rewritten = if DATA_KEYWORDS.contains(&keyword) {
            value.clone()
        } else if SCHEMA_MAPS.contains(&keyword) {
            match value {
                Value::Object(map) => {
                    let mut entries = Map::new();
                    for (name, sub) in map {
                        entries.insert(name.clone(), rewrite_schema(sub, handles)?);
                    }
                    Value::Object(entries)
                }
                other => other.clone(),
            }
        } else {
            match value {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| rewrite_schema(item, handles))
                        .collect::<Result<_, _>>()?,
                ),
                Value::Object(_) => rewrite_schema(value, handles)?,
                other => other.clone(),
            }
        };
        out.insert(keyword.to_string(), rewritten);
    }

    if obj.get("nullable").and_then(Value::as_bool) == Some(true) {
        match out.get_mut("type") {
            Some(Value::String(single)) => {
                let single = std::mem::take(single);
                out.insert("type".to_string(), json!([single, "null"]));
            }
            Some(Value::Array(types)) => {
                if !types.iter().any(|t| t == "null") {
                    types.push(Value::String("null".to_string()));
                }
            }
            _ => {}
        }
    }

    Ok(Value::Object(out))
}

/// Lower a YAML document to JSON.
///
/// Status codes are usually written as bare integers (`200:`), so scalar
/// mapping keys are stringified. Any other key is rejected with the pointer
/// of the mapping that holds it.
fn yaml_document(yaml: serde_yaml::Value, pointer: &str) -> Result<Value, String> {
    use serde_yaml::Value as Yaml;

    match yaml {
        Yaml::Mapping(mapping) => {
            let mut object = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        return Err(format!("mapping key at '{pointer}' must be a scalar, found {other:?}"))
                    }
                };
                let escaped = key.replace('~', "~0").replace('/', "~1");
                let value = yaml_document(value, &format!("{pointer}/{escaped}"))?;
                object.insert(key, value);
            }
            Ok(Value::Object(object))
        }
        Yaml::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| yaml_document(item, &format!("{pointer}/{i}")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Tagged(tagged) => yaml_document(tagged.value, pointer),
        scalar => serde_json::to_value(&scalar)
            .map_err(|e| format!("value at '{pointer}' has no JSON form: {e}")),
    }
}
