//! Effective recipe with provenance
//!
//! Captures the merged recipe together with the files that contributed to
//! it, so a build can report exactly which inputs produced its bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::bundle::BundleConfig;
use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Schema identifier for the serialized effective recipe
pub const SCHEMA_ID: &str = "appimage-primer/effective_recipe@1";

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Recipe,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged recipe plus the layers it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// The merged recipe
    pub config: Value,

    /// Contributing layers, lowest precedence first
    pub sources: Vec<ConfigSource>,
}

/// Keys whose values never appear in serialized output
const SECRET_KEYS: &[&str] = &["passphrase", "password", "token", "secret"];

const REDACTED: &str = "[REDACTED]";

impl EffectiveConfig {
    /// Merge built-in defaults, an optional recipe file and CLI overrides.
    pub fn build(recipe_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = recipe_path {
            let (value, digest) = Self::load_recipe(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Recipe,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        Ok(Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merge_layers(layers),
            sources,
        })
    }

    /// Deserialize and validate the typed bundle configuration.
    pub fn bundle_config(&self) -> Result<BundleConfig, ConfigError> {
        let config: BundleConfig = serde_json::from_value(self.config.clone())?;
        config.validated()
    }

    /// Read a recipe file, returning its value and the digest of its bytes
    fn load_recipe(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let text = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!("invalid UTF-8: {}", e),
        })?;
        let table: toml::Value = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok((toml_to_json(table), digest))
    }

    /// Copy of the merged recipe with secret-looking values masked.
    pub fn redacted(&self) -> (Value, Vec<String>) {
        let mut value = self.config.clone();
        let mut paths = Vec::new();
        redact(&mut value, "", &mut paths);
        (value, paths)
    }

    /// Serialize with secrets masked
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let (config, redactions) = self.redacted();
        serde_json::to_string_pretty(&serde_json::json!({
            "schema_id": self.schema_id,
            "created_at": self.created_at,
            "config": config,
            "sources": self.sources,
            "redactions": redactions,
        }))
    }

    /// Get a value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.config, |node, key| node.get(key))
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn redact(value: &mut Value, prefix: &str, paths: &mut Vec<String>) {
    if let Value::Object(map) = value {
        for (key, child) in map.iter_mut() {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            let lower = key.to_lowercase();
            if SECRET_KEYS.iter().any(|s| lower.contains(s)) && !child.is_object() {
                *child = Value::String(REDACTED.to_string());
                paths.push(path);
            } else {
                redact(child, &path, paths);
            }
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("recipe shape error: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("invalid recipe: {0}")]
    Invalid(String),
}
