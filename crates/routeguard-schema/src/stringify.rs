//! Schema-shaped JSON rendering for the fast-serialization path.
//!
//! Only declared properties are written. Extras survive only when
//! `additionalProperties` (or a matching `patternProperties` entry) admits
//! them. Primitives are coerced to their declared type and required
//! properties must be present.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::coerce::coerce_any;
use crate::compiler::Engine;
use crate::error::StringifyError;
use crate::plan::{child_path, Additional, Node, PatternNode, Plan};

#[derive(Default)]
struct ObjectShape<'a> {
    declared: bool,
    properties: BTreeMap<&'a str, &'a Node>,
    patterns: Vec<&'a PatternNode>,
    required: BTreeSet<&'a str>,
    additional: Option<&'a Node>,
    allow_all: bool,
}

impl Engine {
    pub(crate) fn stringify(
        &self,
        node: &Node,
        value: &Value,
        path: &str,
        out: &mut String,
    ) -> Result<(), StringifyError> {
        match node {
            Node::Schema(plan) => self.stringify_plan(plan, value, path, out),
            Node::Ref(target) => match self.resolve(target) {
                Some(schema) => self.stringify(&schema.root, value, path, out),
                None => write_raw(value, out),
            },
        }
    }

    fn stringify_plan(
        &self,
        plan: &Plan,
        value: &Value,
        path: &str,
        out: &mut String,
    ) -> Result<(), StringifyError> {
        let coerced;
        let value = if plan.types.is_empty() || plan.types.iter().any(|t| t.matches(value)) {
            value
        } else {
            coerced = coerce_any(value, &plan.types).ok_or_else(|| StringifyError::Coercion {
                path: path.to_string(),
                expected: plan
                    .types
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
            })?;
            &coerced
        };

        match value {
            Value::Object(map) => {
                let mut shape = ObjectShape::default();
                self.collect_shape(plan, &mut shape);
                if shape.declared {
                    self.stringify_object(&shape, map, path, out)
                } else {
                    write_raw(value, out)
                }
            }
            Value::Array(items) if !plan.prefix_items.is_empty() || plan.items.is_some() => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let here = child_path(path, &i.to_string());
                    match plan.prefix_items.get(i).or(plan.items.as_deref()) {
                        Some(node) => self.stringify(node, item, &here, out)?,
                        None => write_raw(item, out)?,
                    }
                }
                out.push(']');
                Ok(())
            }
            _ => write_raw(value, out),
        }
    }

    fn stringify_object(
        &self,
        shape: &ObjectShape<'_>,
        map: &Map<String, Value>,
        path: &str,
        out: &mut String,
    ) -> Result<(), StringifyError> {
        if let Some(missing) = shape.required.iter().find(|name| !map.contains_key(**name)) {
            return Err(StringifyError::MissingRequired {
                path: path.to_string(),
                property: missing.to_string(),
            });
        }

        out.push('{');
        let mut first = true;
        for (name, node) in &shape.properties {
            if let Some(child) = map.get(*name) {
                write_key(name, &mut first, out)?;
                self.stringify(node, child, &child_path(path, name), out)?;
            }
        }
        for (key, child) in map {
            if shape.properties.contains_key(key.as_str()) {
                continue;
            }
            let here = child_path(path, key);
            if let Some(pattern) = shape.patterns.iter().find(|p| p.matches(key)) {
                write_key(key, &mut first, out)?;
                self.stringify(&pattern.node, child, &here, out)?;
            } else if let Some(node) = shape.additional {
                write_key(key, &mut first, out)?;
                self.stringify(node, child, &here, out)?;
            } else if shape.allow_all {
                write_key(key, &mut first, out)?;
                write_raw(child, out)?;
            }
        }
        out.push('}');
        Ok(())
    }

    /// Merge `plan` and its `allOf` branches into one object shape.
    fn collect_shape<'a>(&'a self, plan: &'a Plan, shape: &mut ObjectShape<'a>) {
        shape.declared |= plan.has_object_keywords()
            || !plan.required.is_empty()
            || !matches!(plan.additional, Additional::Unspecified);
        for (name, node) in &plan.properties {
            shape.properties.entry(name.as_str()).or_insert(node);
        }
        shape.patterns.extend(plan.pattern_properties.iter());
        shape.required.extend(plan.required.iter().map(String::as_str));
        match &plan.additional {
            Additional::Allowed => shape.allow_all = true,
            Additional::Schema(node) if shape.additional.is_none() => {
                shape.additional = Some(node.as_ref())
            }
            _ => {}
        }
        for branch in &plan.all_of {
            self.collect_node_shape(branch, shape);
        }
    }

    fn collect_node_shape<'a>(&'a self, node: &'a Node, shape: &mut ObjectShape<'a>) {
        match node {
            Node::Schema(plan) => self.collect_shape(plan, shape),
            Node::Ref(target) => {
                if let Some(schema) = self.resolve(target) {
                    self.collect_node_shape(&schema.root, shape);
                }
            }
        }
    }
}

fn write_key(key: &str, first: &mut bool, out: &mut String) -> Result<(), StringifyError> {
    if !*first {
        out.push(',');
    }
    *first = false;
    out.push_str(&serde_json::to_string(key).map_err(|e| StringifyError::Encode(e.to_string()))?);
    out.push(':');
    Ok(())
}

fn write_raw(value: &Value, out: &mut String) -> Result<(), StringifyError> {
    let text = serde_json::to_string(value).map_err(|e| StringifyError::Encode(e.to_string()))?;
    out.push_str(&text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{forward_ref, CompilerOptions, SchemaCompiler, SchemaRegistry, StringifyError};
    use routeguard_core::SchemaFragment;
    use serde_json::{json, Value};

    fn fragment(value: Value) -> SchemaFragment {
        SchemaFragment::try_from(value).unwrap()
    }

    fn stringify(schema: Value, value: Value) -> Result<String, StringifyError> {
        SchemaCompiler::default()
            .compile_stringifier(&fragment(schema))
            .unwrap()
            .stringify(&value)
    }

    #[test]
    fn drops_undeclared_properties() {
        let out = stringify(
            json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "foo": {"type": "string"},
                    "hello": {"type": "string"},
                    "age": {"type": "number"}
                }
            }),
            json!({"success": true, "foo": "bar", "hello": "world", "age": 1, "extra": "x"}),
        )
        .unwrap();
        assert_eq!(out, r#"{"age":1,"foo":"bar","hello":"world","success":true}"#);
    }

    #[test]
    fn coerces_primitives() {
        let out = stringify(
            json!({"properties": {"id": {"type": "string"}, "n": {"type": "integer"}}}),
            json!({"id": 7, "n": "8"}),
        )
        .unwrap();
        assert_eq!(out, r#"{"id":"7","n":8}"#);
    }

    #[test]
    fn uncoercible_value_fails() {
        let err = stringify(
            json!({"properties": {"n": {"type": "integer"}}}),
            json!({"n": "eight"}),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StringifyError::Coercion {
                path: "/n".into(),
                expected: "integer".into()
            }
        );
    }

    #[test]
    fn missing_required_fails() {
        let err = stringify(
            json!({"properties": {"id": {}}, "required": ["id"]}),
            json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, StringifyError::MissingRequired { property, .. } if property == "id"));
    }

    #[test]
    fn additional_properties_admit_extras() {
        let out = stringify(
            json!({"properties": {"a": {}}, "additionalProperties": {"type": "string"}}),
            json!({"a": 1, "b": 2}),
        )
        .unwrap();
        assert_eq!(out, r#"{"a":1,"b":"2"}"#);
    }

    #[test]
    fn arrays_render_items() {
        let out = stringify(
            json!({"type": "array", "items": {"properties": {"id": {"type": "integer"}}}}),
            json!([{"id": "1", "x": 0}, {"id": 2}]),
        )
        .unwrap();
        assert_eq!(out, r#"[{"id":1},{"id":2}]"#);
    }

    #[test]
    fn unshaped_values_render_as_is() {
        let out = stringify(json!({"type": "object"}), json!({"a": [true], "b": 1})).unwrap();
        assert_eq!(out, r#"{"a":[true],"b":1}"#);
    }

    #[test]
    fn follows_forward_references() {
        let mut registry = SchemaRegistry::new();
        let node = registry.declare("Node");
        registry
            .define(
                node,
                fragment(json!({"properties": {"v": {"type": "string"}, "next": forward_ref(node)}})),
            )
            .unwrap();
        let compiler = SchemaCompiler::new(CompilerOptions::default(), registry).unwrap();
        let stringifier = compiler.compile_stringifier(&fragment(forward_ref(node))).unwrap();
        let out = stringifier
            .stringify(&json!({"v": 1, "next": {"v": 2, "junk": true}}))
            .unwrap();
        assert_eq!(out, r#"{"next":{"v":"2"},"v":"1"}"#);
    }
}
