//! # Schema Compiler
//!
//! [`SchemaCompiler::new`] builds the process-wide engine once: it freezes
//! the [`SchemaRegistry`], compiles every defined registry schema, and
//! rejects registry graphs that would recurse without consuming data.
//! Every validator and stringifier compiled afterwards shares that engine.
//!
//! ## Validation Pipeline
//!
//! [`CompiledValidator::validate`] runs on `&mut Value`:
//!
//! 1. Normalization walk, in place: coercion, defaults, stripping of
//!    undeclared properties, nested passes at forward-reference positions.
//! 2. `jsonschema` evaluation of the normalized value.
//! 3. Errors of both steps are merged. With `all_errors = false` only the
//!    first survives.
//!
//! ## Thread Safety
//!
//! Compiled artifacts hold an `Arc` to the immutable engine and evaluate
//! purely against the caller's data, so they are `Send + Sync` and may be
//! used concurrently without locking.

use std::fmt;
use std::sync::Arc;

use routeguard_core::{SchemaFragment, ValidatorResult};
use serde_json::Value;

use crate::error::{CompileError, StringifyError};
use crate::options::CompilerOptions;
use crate::plan::{evaluation_schema, resource_uri, CompiledSchema, PlanBuilder, RefTarget, SchemaResource};
use crate::registry::{SchemaHandle, SchemaRegistry};

/// Frozen registry plus shared options.
pub(crate) struct Engine {
    pub(crate) options: CompilerOptions,
    entries: Vec<Option<CompiledSchema>>,
    defined: Vec<bool>,
    resources: Vec<SchemaResource>,
}

impl Engine {
    pub(crate) fn resolve<'a>(&'a self, target: &'a RefTarget) -> Option<&'a CompiledSchema> {
        match target {
            RefTarget::Inline(inner) => Some(inner.as_ref()),
            RefTarget::Deferred(handle) => self.entries.get(handle.index()).and_then(Option::as_ref),
        }
    }
}

/// Builds validators and stringifiers against one frozen engine.
#[derive(Clone)]
pub struct SchemaCompiler {
    engine: Arc<Engine>,
}

impl SchemaCompiler {
    /// Freeze `registry` and compile every defined schema in it.
    ///
    /// # Errors
    ///
    /// Any registry schema that fails to compile, or a chain of registry
    /// schemas that references itself through the root, `allOf` or another
    /// in-place applicator without descending into the instance.
    pub fn new(options: CompilerOptions, registry: SchemaRegistry) -> Result<Self, CompileError> {
        let defined: Vec<bool> = registry.handles().map(|(h, _)| registry.is_defined(h)).collect();

        let mut resources = Vec::new();
        for (handle, name) in registry.handles() {
            if let Some(fragment) = registry.get(handle) {
                let contents =
                    evaluation_schema(fragment.as_value(), &format!("{name}#"), &defined, false, &mut Vec::new())?;
                resources.push(SchemaResource {
                    uri: resource_uri(handle),
                    contents,
                });
            }
        }

        let builder = PlanBuilder::new(&options, &defined, &resources);

        let mut entries = Vec::with_capacity(registry.len());
        for (handle, name) in registry.handles() {
            let compiled = match registry.get(handle) {
                Some(fragment) => Some(builder.compile(fragment.as_value(), &format!("{name}#"))?),
                None => None,
            };
            entries.push(compiled);
        }

        check_cycles(&registry, &entries)?;
        tracing::debug!(schemas = registry.len(), "schema registry compiled");

        Ok(Self {
            engine: Arc::new(Engine {
                options,
                entries,
                defined,
                resources,
            }),
        })
    }

    /// Engine without registry schemas.
    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            engine: Arc::new(Engine {
                options,
                entries: Vec::new(),
                defined: Vec::new(),
                resources: Vec::new(),
            }),
        }
    }

    /// Options every artifact of this compiler uses.
    pub fn options(&self) -> &CompilerOptions {
        &self.engine.options
    }

    /// Compile a validating function for `fragment`.
    pub fn compile(&self, fragment: &SchemaFragment) -> Result<CompiledValidator, CompileError> {
        Ok(CompiledValidator {
            engine: Arc::clone(&self.engine),
            schema: Arc::new(self.build(fragment)?),
        })
    }

    /// Compile a serializing function for `fragment`.
    pub fn compile_stringifier(
        &self,
        fragment: &SchemaFragment,
    ) -> Result<CompiledStringifier, CompileError> {
        Ok(CompiledStringifier {
            engine: Arc::clone(&self.engine),
            schema: Arc::new(self.build(fragment)?),
        })
    }

    fn build(&self, fragment: &SchemaFragment) -> Result<CompiledSchema, CompileError> {
        PlanBuilder::new(&self.engine.options, &self.engine.defined, &self.engine.resources)
            .compile(fragment.as_value(), "")
    }
}

impl Default for SchemaCompiler {
    fn default() -> Self {
        Self::with_options(CompilerOptions::default())
    }
}

impl fmt::Debug for SchemaCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCompiler")
            .field("options", &self.engine.options)
            .field("registry_schemas", &self.engine.entries.len())
            .finish()
    }
}

fn check_cycles(
    registry: &SchemaRegistry,
    entries: &[Option<CompiledSchema>],
) -> Result<(), CompileError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Fresh,
        Active,
        Done,
    }

    fn visit(
        index: usize,
        entries: &[Option<CompiledSchema>],
        marks: &mut [Mark],
    ) -> Result<(), usize> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::Active => return Err(index),
            Mark::Fresh => {}
        }
        marks[index] = Mark::Active;
        let mut next: Vec<SchemaHandle> = Vec::new();
        if let Some(Some(schema)) = entries.get(index) {
            schema.root.same_location_refs(&mut next);
        }
        for handle in next {
            if handle.index() < marks.len() {
                visit(handle.index(), entries, marks)?;
            }
        }
        marks[index] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Fresh; entries.len()];
    for index in 0..entries.len() {
        visit(index, entries, &mut marks).map_err(|at| CompileError::ReferenceCycle {
            name: registry
                .handles()
                .nth(at)
                .map(|(_, name)| name.to_string())
                .unwrap_or_default(),
        })?;
    }
    Ok(())
}

/// Executable validating function for one schema fragment.
#[derive(Clone)]
pub struct CompiledValidator {
    engine: Arc<Engine>,
    schema: Arc<CompiledSchema>,
}

impl CompiledValidator {
    /// Normalize `value` in place and check it.
    pub fn validate(&self, value: &mut Value) -> ValidatorResult {
        ValidatorResult::from_errors(self.engine.run(&self.schema, value, true))
    }

    /// The schema this validator was compiled from.
    pub fn schema(&self) -> &Value {
        &self.schema.source
    }
}

impl fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("schema", &self.schema.source)
            .finish()
    }
}

/// Executable serializing function for one schema fragment.
#[derive(Clone)]
pub struct CompiledStringifier {
    engine: Arc<Engine>,
    schema: Arc<CompiledSchema>,
}

impl CompiledStringifier {
    /// Render `value` as JSON text shaped by the schema.
    pub fn stringify(&self, value: &Value) -> Result<String, StringifyError> {
        let mut out = String::new();
        self.engine.stringify(&self.schema.root, value, "", &mut out)?;
        Ok(out)
    }

    /// Normalize `value` in place the way a validator of the same schema
    /// would. Fallback for bodies that cannot be rendered but are sent anyway.
    pub fn normalize(&self, value: &mut Value) -> ValidatorResult {
        ValidatorResult::from_errors(self.engine.run(&self.schema, value, true))
    }

    /// The schema this stringifier was compiled from.
    pub fn schema(&self) -> &Value {
        &self.schema.source
    }
}

impl fmt::Debug for CompiledStringifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledStringifier")
            .field("schema", &self.schema.source)
            .finish()
    }
}
