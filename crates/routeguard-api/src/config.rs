//! # Validation Configuration
//!
//! One configuration record drives the compiler options, the response
//! strategy, and the adapter's body limits. Values come from defaults, from
//! environment variables, or from a YAML file.

use routeguard_schema::CompilerOptions;
use serde::{Deserialize, Serialize};

/// Default limit for buffered request bodies: 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Default limit for buffered response bodies: 8 MiB.
pub const DEFAULT_RESPONSE_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Deployment-wide validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject unknown schema keywords at bootstrap.
    pub strict: bool,
    /// Drop undeclared properties from validated data.
    pub remove_additional: bool,
    /// Fill absent properties from schema defaults.
    pub use_defaults: bool,
    /// Convert primitives to their declared types.
    pub coerce_types: bool,
    /// Report every violation instead of the first.
    pub all_errors: bool,
    /// Render responses with compiled stringifiers instead of validating them.
    pub fast_serialization: bool,
    /// Maximum request body size the middleware buffers, in bytes.
    pub body_limit: usize,
    /// Maximum size of a response body covered by a schema, in bytes.
    pub response_body_limit: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let options = CompilerOptions::default();
        Self {
            strict: options.strict,
            remove_additional: options.remove_additional,
            use_defaults: options.use_defaults,
            coerce_types: options.coerce_types,
            all_errors: options.all_errors,
            fast_serialization: false,
            body_limit: DEFAULT_BODY_LIMIT,
            response_body_limit: DEFAULT_RESPONSE_BODY_LIMIT,
        }
    }
}

impl ValidationConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables (all optional, defaults per [`ValidationConfig::default`]):
    /// - `ROUTEGUARD_STRICT`
    /// - `ROUTEGUARD_REMOVE_ADDITIONAL`
    /// - `ROUTEGUARD_USE_DEFAULTS`
    /// - `ROUTEGUARD_COERCE_TYPES`
    /// - `ROUTEGUARD_ALL_ERRORS`
    /// - `ROUTEGUARD_FAST_SERIALIZATION`
    /// - `ROUTEGUARD_BODY_LIMIT` (bytes)
    /// - `ROUTEGUARD_RESPONSE_BODY_LIMIT` (bytes)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            strict: env_flag(&lookup, "ROUTEGUARD_STRICT", defaults.strict)?,
            remove_additional: env_flag(
                &lookup,
                "ROUTEGUARD_REMOVE_ADDITIONAL",
                defaults.remove_additional,
            )?,
            use_defaults: env_flag(&lookup, "ROUTEGUARD_USE_DEFAULTS", defaults.use_defaults)?,
            coerce_types: env_flag(&lookup, "ROUTEGUARD_COERCE_TYPES", defaults.coerce_types)?,
            all_errors: env_flag(&lookup, "ROUTEGUARD_ALL_ERRORS", defaults.all_errors)?,
            fast_serialization: env_flag(
                &lookup,
                "ROUTEGUARD_FAST_SERIALIZATION",
                defaults.fast_serialization,
            )?,
            body_limit: env_size(&lookup, "ROUTEGUARD_BODY_LIMIT", defaults.body_limit)?,
            response_body_limit: env_size(
                &lookup,
                "ROUTEGUARD_RESPONSE_BODY_LIMIT",
                defaults.response_body_limit,
            )?,
        })
    }

    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Yaml(e.to_string()))
    }

    /// Compiler options derived from this configuration.
    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            strict: self.strict,
            remove_additional: self.remove_additional,
            use_defaults: self.use_defaults,
            coerce_types: self.coerce_types,
            all_errors: self.all_errors,
        }
    }
}

fn env_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
            expected: "a boolean",
        }),
    }
}

fn env_size(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.clone(),
        expected: "a size in bytes",
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: expected {expected}")]
    InvalidValue {
        var: String,
        value: String,
        expected: &'static str,
    },
    #[error("invalid configuration file: {0}")]
    Yaml(String),
}
