//! Configuration parsing and management for faultline.
//!
//! This crate provides:
//! - Configuration types (`Config`, `FailOn`, etc.)
//! - TOML parsing of `faultline.toml`
//! - Precedence handling (CLI > config file > defaults)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "faultline.toml";

pub const DEFAULT_MAX_MESSAGE_LEN: usize = 512;
pub const DEFAULT_MAX_STACK_TRACE_LEN: usize = 512;
pub const DEFAULT_MAX_ANNOTATIONS: usize = 25;
pub const DEFAULT_MAX_MARKDOWN_ROWS: usize = 10;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Determines when a parsed report should fail the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    /// Fail if there are any error-level violations.
    #[default]
    Error,
    /// Fail if there are any warn-level or error-level violations.
    Warn,
    /// Never fail (always pass unless there's a runtime error).
    Never,
}

/// Description truncation limits, in characters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TruncateConfig {
    #[serde(default)]
    pub max_message_len: Option<usize>,
    #[serde(default)]
    pub max_stack_trace_len: Option<usize>,
}

/// Path normalization configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizeConfig {
    /// Prefixes to strip from file paths found in reports.
    #[serde(default)]
    pub path_strip: Vec<String>,
}

/// Output size limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub max_annotations: Option<usize>,
    #[serde(default)]
    pub max_markdown_rows: Option<usize>,
}

/// Full configuration for faultline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// When to fail the run.
    #[serde(default)]
    pub fail_on: Option<FailOn>,

    #[serde(default)]
    pub truncate: TruncateConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
///
/// This represents the final configuration after applying:
/// 1. Built-in defaults
/// 2. Config file values
/// 3. CLI overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub fail_on: FailOn,
    pub max_message_len: usize,
    pub max_stack_trace_len: usize,
    pub path_strip: Vec<String>,
    pub max_annotations: usize,
    pub max_markdown_rows: usize,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            fail_on: FailOn::Error,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_stack_trace_len: DEFAULT_MAX_STACK_TRACE_LEN,
            path_strip: vec![],
            max_annotations: DEFAULT_MAX_ANNOTATIONS,
            max_markdown_rows: DEFAULT_MAX_MARKDOWN_ROWS,
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn require_positive(name: &str, value: Option<usize>) -> Result<(), ConfigError> {
    if value == Some(0) {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be greater than 0",
            name
        )));
    }
    Ok(())
}

/// Validate configuration values.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    require_positive("truncate.max_message_len", config.truncate.max_message_len)?;
    require_positive(
        "truncate.max_stack_trace_len",
        config.truncate.max_stack_trace_len,
    )?;
    Ok(())
}

/// Search `start` and its parents for `faultline.toml`.
///
/// Returns the first file found. A file that exists but fails to load is
/// reported as an error rather than skipped.
pub fn discover_config_from(start: &Path) -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            let config = load_config(&config_path)?;
            return Ok(Some((config_path, config)));
        }

        if !current.pop() {
            return Ok(None);
        }
    }
}

/// Try to find and load configuration from the standard location.
///
/// Searches for `faultline.toml` in the current directory and parent directories.
pub fn discover_config() -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let current = std::env::current_dir()?;
    discover_config_from(&current)
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub fail_on: Option<FailOn>,
    pub max_message_len: Option<usize>,
    pub max_stack_trace_len: Option<usize>,
    pub path_strip: Option<Vec<String>>,
}

/// Resolve effective configuration from the config file and CLI overrides.
///
/// Precedence: CLI > config file > defaults
pub fn resolve_config(config: Option<&Config>, cli: &CliOverrides) -> EffectiveConfig {
    let mut effective = EffectiveConfig::default();

    // Apply config file values
    if let Some(config) = config {
        if let Some(fail_on) = config.fail_on {
            effective.fail_on = fail_on;
        }
        if let Some(len) = config.truncate.max_message_len {
            effective.max_message_len = len;
        }
        if let Some(len) = config.truncate.max_stack_trace_len {
            effective.max_stack_trace_len = len;
        }
        if let Some(max) = config.output.max_annotations {
            effective.max_annotations = max;
        }
        if let Some(max) = config.output.max_markdown_rows {
            effective.max_markdown_rows = max;
        }
        effective.path_strip = config.normalize.path_strip.clone();
    }

    // Apply CLI overrides
    if let Some(fail_on) = cli.fail_on {
        effective.fail_on = fail_on;
    }
    if let Some(len) = cli.max_message_len {
        effective.max_message_len = len;
    }
    if let Some(len) = cli.max_stack_trace_len {
        effective.max_stack_trace_len = len;
    }
    if let Some(path_strip) = &cli.path_strip {
        effective.path_strip = path_strip.clone();
    }

    effective
}

// ============================================================================
// Tests
// ============================================================================
