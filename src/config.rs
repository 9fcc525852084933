//! Configuration and stub definitions.
//!
//! Defines the stub data model (expectations and canned outputs), lookup
//! queries, and the engine's YAML configuration.

use crate::matcher::Rule;
use crate::value::Fields;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the stub engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory of stub definition files loaded at startup
    #[serde(default)]
    pub stubs_dir: Option<PathBuf>,

    /// Inline stub definitions, registered before the directory is walked
    #[serde(default)]
    pub stubs: Vec<Stub>,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Stub directory loader settings
    #[serde(default)]
    pub loader: LoaderSettings,
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(dir) = &self.stubs_dir {
            if dir.exists() && !dir.is_dir() {
                anyhow::bail!("stubs_dir is not a directory: {}", dir.display());
            }
        }
        self.loader.validate()?;
        Ok(())
    }
}

/// A registered expectation paired with its canned output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stub {
    /// Service name
    pub service: String,

    /// Method name
    pub method: String,

    /// What the request payload must look like
    #[serde(default)]
    pub input: Expectation,

    /// What to answer with
    #[serde(default)]
    pub output: Output,
}

impl Stub {
    /// Create a stub for a service method.
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        input: Expectation,
        output: Output,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            input,
            output,
        }
    }
}

/// Request expectation. An empty mode is treated as absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Expectation {
    /// Whole-payload exact match
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub equals: Fields,

    /// Required field/value subset
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub contains: Fields,

    /// Field name to regex pattern
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub matches: Fields,
}

impl Expectation {
    /// Expectation matching the whole payload exactly.
    pub fn equals(fields: Fields) -> Self {
        Self {
            equals: fields,
            ..Self::default()
        }
    }

    /// Expectation requiring a subset of fields.
    pub fn contains(fields: Fields) -> Self {
        Self {
            contains: fields,
            ..Self::default()
        }
    }

    /// Expectation matching fields against regex patterns.
    pub fn matches(fields: Fields) -> Self {
        Self {
            matches: fields,
            ..Self::default()
        }
    }

    /// Populated modes in evaluation order: equals, contains, matches.
    pub fn modes(&self) -> impl Iterator<Item = (Rule, &Fields)> {
        [
            (Rule::Equals, &self.equals),
            (Rule::Contains, &self.contains),
            (Rule::Matches, &self.matches),
        ]
        .into_iter()
        .filter(|(_, fields)| !fields.is_empty())
    }
}

/// Canned response of a stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Response payload
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,

    /// Error message to answer with instead of `data` (empty = none)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Default for Output {
    fn default() -> Self {
        Self {
            data: empty_object(),
            error: String::new(),
        }
    }
}

impl Output {
    /// Output answering with a payload.
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data,
            error: String::new(),
        }
    }

    /// Output answering with an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: empty_object(),
            error: message.into(),
        }
    }
}

/// Incoming request to resolve against registered stubs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupQuery {
    /// Service name
    pub service: String,

    /// Method name
    pub method: String,

    /// Request payload
    #[serde(default)]
    pub data: Fields,
}

impl LookupQuery {
    /// Create a lookup query.
    pub fn new(service: impl Into<String>, method: impl Into<String>, data: Fields) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            data,
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Log matched lookups
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log lookups that found no stub
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}

/// Stub directory loader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderSettings {
    /// Glob patterns (relative to the stub directory) of files to skip
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_exclude() -> Vec<String> {
    vec!["**/.*".to_string()]
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            exclude: default_exclude(),
        }
    }
}

impl LoaderSettings {
    /// Validate the loader settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.exclude_set()?;
        Ok(())
    }

    /// Compile the exclude patterns into one matcher.
    pub fn exclude_set(&self) -> anyhow::Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern)
                .map_err(|e| anyhow::anyhow!("Invalid exclude glob {}: {}", pattern, e))?;
            builder.add(glob);
        }
        Ok(builder.build()?)
    }
}
