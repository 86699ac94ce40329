//! Configuration loading for the crucible pipeline.
//!
//! A single TOML file with optional sections; every field has a default
//! so an empty file (or no file at all) yields a runnable configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sandbox::SandboxConfig;
use crate::scanner::{DEFAULT_TABLE_VERSION, IndicatorPattern, IndicatorTable};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrucibleConfig {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub collaborator: CollaboratorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

/// Which model produces and rewrites code, and how patiently to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// `ollama` or `anthropic`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL for self-hosted providers; each provider has its own
    /// fallback.
    #[serde(default)]
    pub host: Option<String>,
    /// Environment variable holding the API key for hosted providers.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "llama3:8b".to_string()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_request_timeout_secs() -> u64 {
    180
}
fn default_max_retries() -> u32 {
    2
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            host: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Iteration count and parallelism for a breeding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Also detonate the sanitized side during defense evaluation.
    #[serde(default = "default_detonate_sanitized")]
    pub detonate_sanitized: bool,
}

fn default_iterations() -> u32 {
    5
}
fn default_concurrency() -> usize {
    1
}
fn default_detonate_sanitized() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            concurrency: default_concurrency(),
            detonate_sanitized: default_detonate_sanitized(),
        }
    }
}

/// Detection surface for the indicator scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_table_version")]
    pub version: String,
    /// Explicit pattern table; the builtin table applies when absent.
    #[serde(default)]
    pub patterns: Option<Vec<IndicatorPattern>>,
}

fn default_table_version() -> String {
    DEFAULT_TABLE_VERSION.to_string()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            version: default_table_version(),
            patterns: None,
        }
    }
}

impl ScannerConfig {
    pub fn build_table(&self) -> IndicatorTable {
        match &self.patterns {
            Some(patterns) => IndicatorTable::new(&self.version, patterns),
            None => IndicatorTable::with_defaults(),
        }
    }
}

/// Where the append-only record files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_attack_file")]
    pub attack_file: PathBuf,
    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,
}

fn default_attack_file() -> PathBuf {
    PathBuf::from("attack_dataset.jsonl")
}
fn default_results_file() -> PathBuf {
    PathBuf::from("defense_results.jsonl")
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            attack_file: default_attack_file(),
            results_file: default_results_file(),
        }
    }
}

impl CrucibleConfig {
    /// Loads configuration: an explicit path must parse, the default
    /// path is used when present, and built-in defaults apply otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(default_path) if default_path.exists() => Self::from_file(&default_path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("crucible").join("config.toml"))
    }
}
