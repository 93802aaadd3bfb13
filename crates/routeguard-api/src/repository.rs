//! # Operation Schema Table
//!
//! Compiled validators keyed by [`OperationId`]. Populated once during
//! bootstrap and read-only afterwards.
//!
//! A [`load`](SchemaRepository::load) either compiles every fragment of the
//! table or changes nothing: the entries are built first and only inserted
//! when all of them succeeded.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use routeguard_core::{LoadError, OperationId, OperationSchemas, RequestSlot, SchemaTable};
use routeguard_schema::{CompiledStringifier, CompiledValidator, SchemaCompiler};

/// Response schema key.
///
/// Ordered so that `Exact < Class < Default`, which is also the resolution
/// precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusKey {
    /// A concrete status code (`"201"`).
    Exact(u16),
    /// A status class (`"2XX"`), holding the leading digit.
    Class(u8),
    /// The `"default"` catch-all.
    Default,
}

impl StatusKey {
    /// Parse a response key. Returns `None` for anything unrecognized.
    pub fn parse(key: &str) -> Option<Self> {
        if key == "default" {
            return Some(Self::Default);
        }
        let bytes = key.as_bytes();
        if bytes.len() != 3 {
            return None;
        }
        if bytes[1..].eq_ignore_ascii_case(b"XX") {
            return match bytes[0] {
                c @ b'1'..=b'5' => Some(Self::Class(c - b'0')),
                _ => None,
            };
        }
        if !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let code: u16 = key.parse().ok()?;
        (100..=599).contains(&code).then_some(Self::Exact(code))
    }

    /// The class key covering `status`.
    pub fn class_of(status: u16) -> Self {
        // Truncation is exact for the 100..=599 range.
        Self::Class((status / 100) as u8)
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(code) => write!(f, "{code}"),
            Self::Class(class) => write!(f, "{class}XX"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Compiled response artifact: validator or, in fast-serialization mode,
/// stringifier.
#[derive(Debug, Clone)]
pub enum ResponseSlot {
    Validator(CompiledValidator),
    Stringifier(CompiledStringifier),
}

/// Compiled counterpart of [`OperationSchemas`].
#[derive(Debug, Clone, Default)]
pub struct OperationValidators {
    pub parameters: Option<CompiledValidator>,
    pub query: Option<CompiledValidator>,
    pub headers: Option<CompiledValidator>,
    pub body: Option<CompiledValidator>,
    pub responses: BTreeMap<StatusKey, ResponseSlot>,
}

impl OperationValidators {
    /// Validator for a request slot, if one was declared.
    pub fn request(&self, slot: RequestSlot) -> Option<&CompiledValidator> {
        match slot {
            RequestSlot::Parameters => self.parameters.as_ref(),
            RequestSlot::Query => self.query.as_ref(),
            RequestSlot::Headers => self.headers.as_ref(),
            RequestSlot::Body => self.body.as_ref(),
        }
    }

    /// Response artifact for `status`: exact code, then class, then `default`.
    pub fn response(&self, status: u16) -> Option<&ResponseSlot> {
        self.responses
            .get(&StatusKey::Exact(status))
            .or_else(|| self.responses.get(&StatusKey::class_of(status)))
            .or_else(|| self.responses.get(&StatusKey::Default))
    }

    /// Whether any response schema is declared.
    pub fn has_responses(&self) -> bool {
        !self.responses.is_empty()
    }

    fn request_slot_mut(&mut self, slot: RequestSlot) -> &mut Option<CompiledValidator> {
        match slot {
            RequestSlot::Parameters => &mut self.parameters,
            RequestSlot::Query => &mut self.query,
            RequestSlot::Headers => &mut self.headers,
            RequestSlot::Body => &mut self.body,
        }
    }
}

/// Options for one [`SchemaRepository::load`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Compile response schemas to stringifiers instead of validators.
    pub fast_serialization: bool,
}

/// Compiled validators for every known operation.
#[derive(Debug, Clone)]
pub struct SchemaRepository {
    compiler: SchemaCompiler,
    entries: HashMap<OperationId, OperationValidators>,
}

impl SchemaRepository {
    /// Create an empty repository compiling with `compiler`.
    pub fn new(compiler: SchemaCompiler) -> Self {
        Self {
            compiler,
            entries: HashMap::new(),
        }
    }

    /// Compile `table` and install it.
    ///
    /// Operations present in `table` replace existing entries; others are
    /// left untouched. On error nothing is installed.
    pub fn load(&mut self, table: &SchemaTable, options: LoadOptions) -> Result<(), LoadError> {
        let mut compiled = Vec::with_capacity(table.len());
        for (id, schemas) in table.iter() {
            compiled.push((id.clone(), self.compile_operation(id, schemas, options)?));
        }
        let count = compiled.len();
        self.entries.extend(compiled);
        tracing::debug!(
            operations = count,
            total = self.entries.len(),
            fast_serialization = options.fast_serialization,
            "schema table loaded"
        );
        Ok(())
    }

    fn compile_operation(
        &self,
        id: &OperationId,
        schemas: &OperationSchemas,
        options: LoadOptions,
    ) -> Result<OperationValidators, LoadError> {
        let compile_error = |slot: &str, reason: String| LoadError::Compile {
            operation: id.to_string(),
            slot: slot.to_string(),
            reason,
        };

        let mut validators = OperationValidators::default();
        for slot in RequestSlot::ALL {
            if let Some(fragment) = schemas.slot(slot) {
                let validator = self
                    .compiler
                    .compile(fragment)
                    .map_err(|e| compile_error(slot.as_str(), e.to_string()))?;
                *validators.request_slot_mut(slot) = Some(validator);
            }
        }

        for (key, fragment) in &schemas.responses {
            let status = StatusKey::parse(key).ok_or_else(|| LoadError::InvalidStatusKey {
                operation: id.to_string(),
                key: key.clone(),
            })?;
            let Some(fragment) = fragment else {
                continue;
            };
            let slot_name = format!("responses/{key}");
            let slot = if options.fast_serialization {
                self.compiler
                    .compile_stringifier(fragment)
                    .map(ResponseSlot::Stringifier)
            } else {
                self.compiler.compile(fragment).map(ResponseSlot::Validator)
            }
            .map_err(|e| compile_error(&slot_name, e.to_string()))?;
            validators.responses.insert(status, slot);
        }

        Ok(validators)
    }

    /// Compiled validators of one operation.
    pub fn get(&self, id: &OperationId) -> Option<&OperationValidators> {
        self.entries.get(id)
    }

    /// Number of operations loaded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no operation is loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loaded operation ids, sorted.
    pub fn operation_ids(&self) -> Vec<&OperationId> {
        let mut ids: Vec<_> = self.entries.keys().collect();
        ids.sort();
        ids
    }

    /// Compiler shared by every loaded validator.
    pub fn compiler(&self) -> &SchemaCompiler {
        &self.compiler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeguard_core::SchemaFragment;
    use serde_json::{json, Value};

    fn fragment(value: Value) -> SchemaFragment {
        SchemaFragment::try_from(value).unwrap()
    }

    fn table(value: Value) -> SchemaTable {
        SchemaTable::from_json(&value).unwrap()
    }

    // ── StatusKey ────────────────────────────────────────────────────

    #[test]
    fn status_keys_parse() {
        assert_eq!(StatusKey::parse("200"), Some(StatusKey::Exact(200)));
        assert_eq!(StatusKey::parse("2XX"), Some(StatusKey::Class(2)));
        assert_eq!(StatusKey::parse("4xx"), Some(StatusKey::Class(4)));
        assert_eq!(StatusKey::parse("default"), Some(StatusKey::Default));
        assert_eq!(StatusKey::parse("600"), None);
        assert_eq!(StatusKey::parse("099"), None);
        assert_eq!(StatusKey::parse("6XX"), None);
        assert_eq!(StatusKey::parse("+20"), None);
        assert_eq!(StatusKey::parse("ok"), None);
        assert_eq!(StatusKey::Class(2).to_string(), "2XX");
    }

    // ── load ─────────────────────────────────────────────────────────

    #[test]
    fn load_compiles_declared_slots_only() {
        let mut repo = SchemaRepository::new(SchemaCompiler::default());
        repo.load(
            &table(json!({"op": {"body": {"type": "object"}, "responses": {"201": true}}})),
            LoadOptions::default(),
        )
        .unwrap();

        let entry = repo.get(&OperationId::from("op")).unwrap();
        assert!(entry.body.is_some());
        assert!(entry.parameters.is_none());
        assert!(entry.query.is_none());
        assert!(entry.headers.is_none());
        assert!(matches!(entry.response(201), Some(ResponseSlot::Validator(_))));
        assert!(entry.response(200).is_none());
    }

    #[test]
    fn fast_serialization_compiles_stringifiers() {
        let mut repo = SchemaRepository::new(SchemaCompiler::default());
        repo.load(
            &table(json!({"op": {"responses": {"200": {"type": "object"}}}})),
            LoadOptions {
                fast_serialization: true,
            },
        )
        .unwrap();
        let entry = repo.get(&OperationId::from("op")).unwrap();
        assert!(matches!(entry.response(200), Some(ResponseSlot::Stringifier(_))));
    }

    #[test]
    fn response_resolution_precedence() {
        let schemas = OperationSchemas::default()
            .with_response("200", fragment(json!({"title": "exact"})))
            .with_response("2XX", fragment(json!({"title": "class"})))
            .with_response("default", fragment(json!({"title": "default"})));
        let mut t = SchemaTable::new();
        t.insert(OperationId::from("op"), schemas);

        let mut repo = SchemaRepository::new(SchemaCompiler::default());
        repo.load(&t, LoadOptions::default()).unwrap();
        let entry = repo.get(&OperationId::from("op")).unwrap();

        let title = |status| match entry.response(status) {
            Some(ResponseSlot::Validator(v)) => v.schema()["title"].clone(),
            _ => Value::Null,
        };
        assert_eq!(title(200), "exact");
        assert_eq!(title(204), "class");
        assert_eq!(title(500), "default");
    }

    #[test]
    fn invalid_status_key_is_rejected() {
        let mut repo = SchemaRepository::new(SchemaCompiler::default());
        let err = repo
            .load(&table(json!({"op": {"responses": {"teapot": true}}})), LoadOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            LoadError::InvalidStatusKey {
                operation: "op".into(),
                key: "teapot".into()
            }
        );
    }

    #[test]
    fn compile_failure_installs_nothing() {
        let mut repo = SchemaRepository::new(SchemaCompiler::default());
        let err = repo
            .load(
                &table(json!({
                    "a": {"body": {"type": "object"}},
                    "b": {"query": {"type": "no-such-type"}}
                })),
                LoadOptions::default(),
            )
            .unwrap_err();
        match err {
            LoadError::Compile { operation, slot, .. } => {
                assert_eq!(operation, "b");
                assert_eq!(slot, "query");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(repo.is_empty());
    }

    #[test]
    fn reload_replaces_present_operations_only() {
        let mut repo = SchemaRepository::new(SchemaCompiler::default());
        repo.load(
            &table(json!({"a": {"body": {"title": "a1"}}, "b": {"body": {"title": "b1"}}})),
            LoadOptions::default(),
        )
        .unwrap();
        repo.load(&table(json!({"a": {"body": {"title": "a2"}}})), LoadOptions::default())
            .unwrap();

        let title = |id: &str| {
            repo.get(&OperationId::from(id)).unwrap().body.as_ref().unwrap().schema()["title"]
                .clone()
        };
        assert_eq!(title("a"), "a2");
        assert_eq!(title("b"), "b1");
        assert_eq!(repo.len(), 2);
        assert_eq!(
            repo.operation_ids(),
            vec![&OperationId::from("a"), &OperationId::from("b")]
        );
    }

    #[test]
    fn load_is_idempotent() {
        let t = table(json!({"a": {"body": {"type": "object"}}}));
        let mut repo = SchemaRepository::new(SchemaCompiler::default());
        repo.load(&t, LoadOptions::default()).unwrap();
        repo.load(&t, LoadOptions::default()).unwrap();
        assert_eq!(repo.len(), 1);
        assert!(repo.get(&OperationId::from("a")).unwrap().body.is_some());
    }
}
