//! # Normalization Plan
//!
//! A compiled schema has two halves:
//!
//! - a [`Plan`] tree holding only what in-place normalization needs
//!   (declared types, defaults, property maps, item schemas, `allOf`
//!   branches and forward-reference targets);
//! - a `jsonschema` [`Validator`] for the same schema, with every marker
//!   replaced by `true`. Marker positions are checked by nested passes.
//!
//! Markers are followed by the normalization walk at positions that map one
//! instance location to one subschema: the root, `properties/*`,
//! `patternProperties/*`, `additionalProperties`, `items`, `prefixItems/*`
//! and `allOf/*`. Anywhere else (`anyOf`, `oneOf`, `not`, conditionals,
//! ...) a marker becomes a `$ref` to the registry schema, which every
//! validator carries as a `urn:routeguard:schema:<n>` resource. Those
//! branches are only evaluated, never normalized.

use std::collections::BTreeMap;
use std::sync::Arc;

use jsonschema::{Draft, Validator};
use serde_json::{json, Map, Value};

use crate::coerce::JsonType;
use crate::error::CompileError;
use crate::keywords;
use crate::options::CompilerOptions;
use crate::registry::{SchemaHandle, SchemaRef, FORWARD_REF};

/// Keywords whose values are instance data, never schemas.
const DATA_KEYWORDS: &[&str] = &["default", "const", "enum", "examples"];

/// Applicators whose subschemas apply to the same instance location.
const IN_PLACE: &[&str] = &["allOf", "anyOf", "oneOf", "not", "if", "then", "else"];

/// A registry schema in the form `jsonschema` resolves `$ref`s against.
pub(crate) struct SchemaResource {
    pub(crate) uri: String,
    pub(crate) contents: Value,
}

pub(crate) struct CompiledSchema {
    pub(crate) root: Node,
    pub(crate) validator: Validator,
    pub(crate) source: Value,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

pub(crate) enum Node {
    Schema(Box<Plan>),
    Ref(RefTarget),
}

pub(crate) enum RefTarget {
    Inline(Arc<CompiledSchema>),
    Deferred(SchemaHandle),
}

pub(crate) struct PatternNode {
    pub(crate) source: String,
    matcher: Validator,
    pub(crate) node: Node,
}

impl PatternNode {
    pub(crate) fn matches(&self, key: &str) -> bool {
        self.matcher.is_valid(&Value::String(key.to_string()))
    }
}

#[derive(Default)]
pub(crate) enum Additional {
    #[default]
    Unspecified,
    Allowed,
    Forbidden,
    Schema(Box<Node>),
}

#[derive(Default)]
pub(crate) struct Plan {
    pub(crate) types: Vec<JsonType>,
    pub(crate) default: Option<Value>,
    pub(crate) required: Vec<String>,
    pub(crate) properties: BTreeMap<String, Node>,
    pub(crate) pattern_properties: Vec<PatternNode>,
    pub(crate) additional: Additional,
    pub(crate) prefix_items: Vec<Node>,
    pub(crate) prefix_keyword: &'static str,
    pub(crate) items: Option<Box<Node>>,
    pub(crate) all_of: Vec<Node>,
    /// Registry handles reached in place from evaluation-only applicators.
    pub(crate) applied: Vec<SchemaHandle>,
}

impl Plan {
    pub(crate) fn has_object_keywords(&self) -> bool {
        !self.properties.is_empty() || !self.pattern_properties.is_empty()
    }

    /// Undeclared keys are dropped unless `additionalProperties` admits them.
    pub(crate) fn strips(&self) -> bool {
        self.has_object_keywords()
            && !matches!(self.additional, Additional::Allowed | Additional::Schema(_))
    }

    pub(crate) fn declares_own(&self, key: &str) -> bool {
        self.properties.contains_key(key) || self.pattern_properties.iter().any(|p| p.matches(key))
    }

    pub(crate) fn admits_any(&self) -> bool {
        matches!(self.additional, Additional::Allowed | Additional::Schema(_))
    }
}

impl Node {
    /// Registry handles reachable without descending into the instance.
    pub(crate) fn same_location_refs(&self, out: &mut Vec<SchemaHandle>) {
        match self {
            Node::Ref(RefTarget::Deferred(handle)) => out.push(*handle),
            Node::Ref(RefTarget::Inline(inner)) => inner.root.same_location_refs(out),
            Node::Schema(plan) => {
                out.extend_from_slice(&plan.applied);
                plan.all_of.iter().for_each(|n| n.same_location_refs(out));
            }
        }
    }
}

/// Compiles schema values against a fixed set of defined registry handles.
pub(crate) struct PlanBuilder<'a> {
    options: &'a CompilerOptions,
    defined: &'a [bool],
    resources: &'a [SchemaResource],
}

impl<'a> PlanBuilder<'a> {
    pub(crate) fn new(
        options: &'a CompilerOptions,
        defined: &'a [bool],
        resources: &'a [SchemaResource],
    ) -> Self {
        Self {
            options,
            defined,
            resources,
        }
    }

    pub(crate) fn compile(&self, schema: &Value, path: &str) -> Result<CompiledSchema, CompileError> {
        if self.options.strict {
            keywords::check(schema, path)?;
        }
        self.compile_unchecked(schema, path)
    }

    fn compile_unchecked(&self, schema: &Value, path: &str) -> Result<CompiledSchema, CompileError> {
        let (root, companion) = self.node(schema, path)?;
        let validator = build_validator(&companion, self.resources).map_err(|reason| CompileError::InvalidSchema {
            path: path.to_string(),
            reason,
        })?;
        Ok(CompiledSchema {
            root,
            validator,
            source: schema.clone(),
        })
    }

    fn node(&self, schema: &Value, path: &str) -> Result<(Node, Value), CompileError> {
        match SchemaRef::from_marker(schema) {
            None => {
                let (plan, companion) = self.plan(schema, path)?;
                Ok((Node::Schema(Box::new(plan)), companion))
            }
            Some(Err(reason)) => Err(CompileError::InvalidSchema {
                path: path.to_string(),
                reason,
            }),
            Some(Ok(SchemaRef::Deferred(handle))) => {
                check_defined(self.defined, handle, path)?;
                Ok((Node::Ref(RefTarget::Deferred(handle)), Value::Bool(true)))
            }
            Some(Ok(SchemaRef::Inline(inner))) => {
                let compiled = self.compile_unchecked(&inner, &child_path(path, FORWARD_REF))?;
                Ok((Node::Ref(RefTarget::Inline(Arc::new(compiled))), Value::Bool(true)))
            }
        }
    }

    fn plan(&self, schema: &Value, path: &str) -> Result<(Plan, Value), CompileError> {
        let obj = match schema {
            Value::Bool(_) => return Ok((Plan::default(), schema.clone())),
            Value::Object(obj) => obj,
            _ => return Err(invalid(path, "expected an object or boolean schema")),
        };

        let mut plan = Plan {
            prefix_keyword: "prefixItems",
            ..Plan::default()
        };
        let mut companion = obj.clone();

        for (keyword, value) in obj {
            let here = child_path(path, keyword);
            match keyword.as_str() {
                "type" => {
                    plan.types = parse_types(value).ok_or_else(|| invalid(&here, "unknown type"))?;
                }
                "default" => plan.default = Some(value.clone()),
                "required" => {
                    plan.required = value
                        .as_array()
                        .map(|names| {
                            names
                                .iter()
                                .filter_map(|n| n.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                }
                "properties" => {
                    let map = value
                        .as_object()
                        .ok_or_else(|| invalid(&here, "properties must be an object"))?;
                    let mut rewritten = Map::new();
                    for (name, sub) in map {
                        let (node, sub_companion) = self.node(sub, &child_path(&here, name))?;
                        plan.properties.insert(name.clone(), node);
                        rewritten.insert(name.clone(), sub_companion);
                    }
                    companion.insert(keyword.clone(), Value::Object(rewritten));
                }
                "patternProperties" => {
                    let map = value
                        .as_object()
                        .ok_or_else(|| invalid(&here, "patternProperties must be an object"))?;
                    let mut rewritten = Map::new();
                    for (pattern, sub) in map {
                        let at = child_path(&here, pattern);
                        let matcher = build_validator(&json!({ "type": "string", "pattern": pattern }), &[])
                            .map_err(|reason| CompileError::InvalidSchema {
                                path: at.clone(),
                                reason,
                            })?;
                        let (node, sub_companion) = self.node(sub, &at)?;
                        plan.pattern_properties.push(PatternNode {
                            source: pattern.clone(),
                            matcher,
                            node,
                        });
                        rewritten.insert(pattern.clone(), sub_companion);
                    }
                    companion.insert(keyword.clone(), Value::Object(rewritten));
                }
                "additionalProperties" => {
                    plan.additional = match value {
                        Value::Bool(true) => Additional::Allowed,
                        Value::Bool(false) => Additional::Forbidden,
                        _ => {
                            let (node, sub_companion) = self.node(value, &here)?;
                            companion.insert(keyword.clone(), sub_companion);
                            Additional::Schema(Box::new(node))
                        }
                    };
                }
                "items" => match value {
                    Value::Array(list) => {
                        let (nodes, rewritten) = self.node_list(list, &here)?;
                        plan.prefix_items = nodes;
                        plan.prefix_keyword = "items";
                        companion.insert(keyword.clone(), rewritten);
                    }
                    _ => {
                        let (node, sub_companion) = self.node(value, &here)?;
                        plan.items = Some(Box::new(node));
                        companion.insert(keyword.clone(), sub_companion);
                    }
                },
                "prefixItems" | "allOf" => {
                    let list = value
                        .as_array()
                        .ok_or_else(|| invalid(&here, "expected an array of schemas"))?;
                    let (nodes, rewritten) = self.node_list(list, &here)?;
                    if keyword == "allOf" {
                        plan.all_of = nodes;
                    } else {
                        plan.prefix_items = nodes;
                    }
                    companion.insert(keyword.clone(), rewritten);
                }
                k if DATA_KEYWORDS.contains(&k) => {}
                k => {
                    let in_place = IN_PLACE.contains(&k);
                    let rewritten =
                        evaluation_schema(value, &here, self.defined, in_place, &mut plan.applied)?;
                    companion.insert(keyword.clone(), rewritten);
                }
            }
        }

        Ok((plan, Value::Object(companion)))
    }

    fn node_list(&self, list: &[Value], path: &str) -> Result<(Vec<Node>, Value), CompileError> {
        let mut nodes = Vec::with_capacity(list.len());
        let mut rewritten = Vec::with_capacity(list.len());
        for (i, sub) in list.iter().enumerate() {
            let (node, sub_companion) = self.node(sub, &child_path(path, &i.to_string()))?;
            nodes.push(node);
            rewritten.push(sub_companion);
        }
        Ok((nodes, Value::Array(rewritten)))
    }
}

/// URI a registry schema is registered under.
pub(crate) fn resource_uri(handle: SchemaHandle) -> String {
    format!("urn:routeguard:schema:{}", handle.index())
}

/// Rewrite every marker in `value` into a `$ref` to its registry resource.
///
/// Handles reached without leaving the instance location are pushed onto
/// `applied` while `in_place` holds.
pub(crate) fn evaluation_schema(
    value: &Value,
    path: &str,
    defined: &[bool],
    in_place: bool,
    applied: &mut Vec<SchemaHandle>,
) -> Result<Value, CompileError> {
    match SchemaRef::from_marker(value) {
        Some(Err(reason)) => return Err(invalid(path, &reason)),
        Some(Ok(SchemaRef::Deferred(handle))) => {
            check_defined(defined, handle, path)?;
            if in_place {
                applied.push(handle);
            }
            return Ok(json!({ "$ref": resource_uri(handle) }));
        }
        Some(Ok(SchemaRef::Inline(inner))) => {
            return evaluation_schema(&inner, &child_path(path, FORWARD_REF), defined, in_place, applied);
        }
        None => {}
    }
    match value {
        Value::Object(obj) => {
            let mut out = Map::new();
            for (key, sub) in obj {
                let rewritten = if DATA_KEYWORDS.contains(&key.as_str()) {
                    sub.clone()
                } else {
                    let here = child_path(path, key);
                    let stays = in_place && IN_PLACE.contains(&key.as_str());
                    evaluation_schema(sub, &here, defined, stays, applied)?
                };
                out.insert(key.clone(), rewritten);
            }
            Ok(Value::Object(out))
        }
        Value::Array(list) => list
            .iter()
            .enumerate()
            .map(|(i, sub)| evaluation_schema(sub, &child_path(path, &i.to_string()), defined, in_place, applied))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn check_defined(defined: &[bool], handle: SchemaHandle, path: &str) -> Result<(), CompileError> {
    if defined.get(handle.index()).copied().unwrap_or(false) {
        Ok(())
    } else {
        Err(CompileError::UndefinedReference {
            handle: handle.index(),
            path: path.to_string(),
        })
    }
}

fn parse_types(value: &Value) -> Option<Vec<JsonType>> {
    match value {
        Value::String(name) => JsonType::parse(name).map(|t| vec![t]),
        Value::Array(names) => names
            .iter()
            .map(|n| n.as_str().and_then(JsonType::parse))
            .collect(),
        _ => None,
    }
}

fn invalid(path: &str, reason: &str) -> CompileError {
    CompileError::InvalidSchema {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Build a Draft 2020-12 validator with format assertions enabled and the
/// registry schemas available as `$ref` targets.
pub(crate) fn build_validator(schema: &Value, resources: &[SchemaResource]) -> Result<Validator, String> {
    let mut opts = jsonschema::options();
    opts.with_draft(Draft::Draft202012);
    opts.should_validate_formats(true);
    for resource in resources {
        opts.with_resource(
            resource.uri.clone(),
            Draft::Draft202012.create_resource(resource.contents.clone()),
        );
    }
    opts.build(schema).map_err(|e| e.to_string())
}

/// Append one JSON Pointer reference token to `base`.
pub(crate) fn child_path(base: &str, token: &str) -> String {
    let escaped = token.replace('~', "~0").replace('/', "~1");
    format!("{base}/{escaped}")
}
