//! Strict-mode keyword check.

use serde_json::Value;

use crate::error::CompileError;
use crate::plan::child_path;
use crate::registry::{SchemaRef, FORWARD_REF};

/// Keywords of Draft 2020-12, the draft-07 spellings still in common use,
/// and the forward-reference marker.
const KNOWN: &[&str] = &[
    "$schema", "$id", "$ref", "$anchor", "$dynamicRef", "$dynamicAnchor", "$defs", "$comment",
    "$vocabulary", "definitions", "type", "enum", "const", "multipleOf", "maximum",
    "exclusiveMaximum", "minimum", "exclusiveMinimum", "maxLength", "minLength", "pattern",
    "maxItems", "minItems", "uniqueItems", "maxContains", "minContains", "maxProperties",
    "minProperties", "required", "dependentRequired", "dependencies", "properties",
    "patternProperties", "additionalProperties", "propertyNames", "unevaluatedProperties",
    "items", "prefixItems", "additionalItems", "contains", "unevaluatedItems", "allOf", "anyOf",
    "oneOf", "not", "if", "then", "else", "dependentSchemas", "format", "contentEncoding",
    "contentMediaType", "contentSchema", "title", "description", "default", "deprecated",
    "readOnly", "writeOnly", "examples", "nullable", FORWARD_REF,
];

const SCHEMA_MAPS: &[&str] = &[
    "properties", "patternProperties", "$defs", "definitions", "dependentSchemas",
];
const SCHEMA_LISTS: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems"];
const SCHEMA_VALUES: &[&str] = &[
    "additionalProperties", "propertyNames", "unevaluatedProperties", "additionalItems",
    "contains", "unevaluatedItems", "not", "if", "then", "else", "contentSchema",
];

/// Reject any keyword outside [`KNOWN`], recursively.
pub(crate) fn check(schema: &Value, path: &str) -> Result<(), CompileError> {
    let Value::Object(obj) = schema else {
        return Ok(());
    };
    if let Some(Ok(SchemaRef::Inline(inner))) = SchemaRef::from_marker(schema) {
        return check(&inner, &child_path(path, FORWARD_REF));
    }
    for (keyword, value) in obj {
        if !KNOWN.contains(&keyword.as_str()) {
            return Err(CompileError::UnknownKeyword {
                keyword: keyword.clone(),
                path: path.to_string(),
            });
        }
        let here = child_path(path, keyword);
        if SCHEMA_MAPS.contains(&keyword.as_str()) {
            if let Value::Object(map) = value {
                for (name, sub) in map {
                    check(sub, &child_path(&here, name))?;
                }
            }
        } else if SCHEMA_LISTS.contains(&keyword.as_str()) {
            if let Value::Array(list) = value {
                for (i, sub) in list.iter().enumerate() {
                    check(sub, &child_path(&here, &i.to_string()))?;
                }
            }
        } else if keyword == "items" {
            match value {
                Value::Array(list) => {
                    for (i, sub) in list.iter().enumerate() {
                        check(sub, &child_path(&here, &i.to_string()))?;
                    }
                }
                other => check(other, &here)?,
            }
        } else if SCHEMA_VALUES.contains(&keyword.as_str()) {
            check(value, &here)?;
        }
    }
    Ok(())
}
