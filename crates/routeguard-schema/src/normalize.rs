//! In-place normalization walk and nested forward-reference passes.

use routeguard_core::FieldError;
use serde_json::{Map, Value};

use crate::coerce::coerce_any;
use crate::compiler::Engine;
use crate::plan::{child_path, Additional, CompiledSchema, Node, Plan};
use crate::registry::FORWARD_REF;

impl Engine {
    /// Normalize `value` against `schema`, then evaluate it.
    ///
    /// `strip` is false for passes entered from an `allOf` branch: the
    /// object owning the `allOf` strips against the union of all branches.
    pub(crate) fn run(&self, schema: &CompiledSchema, value: &mut Value, strip: bool) -> Vec<FieldError> {
        let mut nested = Vec::new();
        self.normalize_node(&schema.root, value, "", "", strip, &mut nested);

        let limit = if self.options.all_errors { usize::MAX } else { 1 };
        let mut errors: Vec<FieldError> = schema
            .validator
            .iter_errors(&*value)
            .take(limit)
            .map(|e| FieldError::new(e.to_string()).at(e.instance_path.to_string(), e.schema_path.to_string()))
            .collect();
        errors.append(&mut nested);
        errors.truncate(limit);
        errors
    }

    fn normalize_node(
        &self,
        node: &Node,
        value: &mut Value,
        instance: &str,
        schema_path: &str,
        strip: bool,
        errors: &mut Vec<FieldError>,
    ) {
        match node {
            Node::Schema(plan) => self.normalize_plan(plan, value, instance, schema_path, strip, errors),
            Node::Ref(target) => {
                let Some(schema) = self.resolve(target) else {
                    return;
                };
                let base = child_path(schema_path, FORWARD_REF);
                for e in self.run(schema, value, strip) {
                    errors.push(FieldError {
                        instance_path: format!("{instance}{}", e.instance_path),
                        schema_path: format!("{base}{}", e.schema_path),
                        message: e.message,
                    });
                }
            }
        }
    }

    fn normalize_plan(
        &self,
        plan: &Plan,
        value: &mut Value,
        instance: &str,
        schema_path: &str,
        strip: bool,
        errors: &mut Vec<FieldError>,
    ) {
        if self.options.coerce_types
            && !plan.types.is_empty()
            && !plan.types.iter().any(|t| t.matches(value))
        {
            if let Some(coerced) = coerce_any(value, &plan.types) {
                *value = coerced;
            }
        }

        if !plan.all_of.is_empty() {
            let base = child_path(schema_path, "allOf");
            for (i, branch) in plan.all_of.iter().enumerate() {
                let at = child_path(&base, &i.to_string());
                self.normalize_node(branch, value, instance, &at, false, errors);
            }
        }

        match value {
            Value::Object(map) => self.normalize_object(plan, map, instance, schema_path, strip, errors),
            Value::Array(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    let (node, at) = match plan.prefix_items.get(i) {
                        Some(node) => (
                            node,
                            child_path(&child_path(schema_path, plan.prefix_keyword), &i.to_string()),
                        ),
                        None => match plan.items.as_deref() {
                            Some(node) => (node, child_path(schema_path, "items")),
                            None => continue,
                        },
                    };
                    let here = child_path(instance, &i.to_string());
                    self.normalize_node(node, item, &here, &at, true, errors);
                }
            }
            _ => {}
        }
    }

    fn normalize_object(
        &self,
        plan: &Plan,
        map: &mut Map<String, Value>,
        instance: &str,
        schema_path: &str,
        strip: bool,
        errors: &mut Vec<FieldError>,
    ) {
        if self.options.use_defaults {
            for (name, node) in &plan.properties {
                if let Node::Schema(sub) = node {
                    if let Some(default) = &sub.default {
                        if !map.contains_key(name) {
                            map.insert(name.clone(), default.clone());
                        }
                    }
                }
            }
        }

        if strip && self.options.remove_additional && plan.strips() && !self.all_of_admits(plan) {
            map.retain(|key, _| self.declares(plan, key));
        }

        for (key, child) in map.iter_mut() {
            let here = child_path(instance, key);
            let mut matched = false;
            if let Some(node) = plan.properties.get(key) {
                matched = true;
                let at = child_path(&child_path(schema_path, "properties"), key);
                self.normalize_node(node, child, &here, &at, true, errors);
            }
            for pattern in plan.pattern_properties.iter().filter(|p| p.matches(key)) {
                matched = true;
                let at = child_path(&child_path(schema_path, "patternProperties"), &pattern.source);
                self.normalize_node(&pattern.node, child, &here, &at, true, errors);
            }
            if !matched {
                if let Additional::Schema(node) = &plan.additional {
                    let at = child_path(schema_path, "additionalProperties");
                    self.normalize_node(node, child, &here, &at, true, errors);
                }
            }
        }
    }

    /// Whether `key` is declared by `plan` or any of its `allOf` branches.
    fn declares(&self, plan: &Plan, key: &str) -> bool {
        plan.declares_own(key) || plan.all_of.iter().any(|n| self.node_declares(n, key))
    }

    fn node_declares(&self, node: &Node, key: &str) -> bool {
        match node {
            Node::Schema(plan) => self.declares(plan, key),
            Node::Ref(target) => self
                .resolve(target)
                .is_some_and(|schema| self.node_declares(&schema.root, key)),
        }
    }

    /// Whether some `allOf` branch admits arbitrary extra properties.
    fn all_of_admits(&self, plan: &Plan) -> bool {
        plan.all_of.iter().any(|n| self.node_admits(n))
    }

    fn node_admits(&self, node: &Node) -> bool {
        match node {
            Node::Schema(plan) => plan.admits_any() || self.all_of_admits(plan),
            Node::Ref(target) => self
                .resolve(target)
                .is_some_and(|schema| self.node_admits(&schema.root)),
        }
    }
}
