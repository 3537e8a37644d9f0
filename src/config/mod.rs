pub mod stack;

pub use stack::{
    ClusterOptions, DeployEnvironment, FileSystemOptions, LoadBalancerOptions, NetworkLayout,
    NetworkOptions, PolicyOptions, Profile, ScalingOptions, SecondaryTargetOptions,
    ServiceOptions, StackConfig,
};

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Environment variable consulted when the config names no account
pub const ACCOUNT_ENV: &str = "STACKFORGE_ACCOUNT";
/// Environment variable consulted when the config names no region
pub const REGION_ENV: &str = "STACKFORGE_REGION";

/// Errors for config file I/O and parsing
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse stack config: {0}")]
    ParseError(String),

    #[error("Failed to expand '{value}': {reason}")]
    ExpandError { value: String, reason: String },
}

/// Serialization format of a stack config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from a file extension; anything but `.yaml`/`.yml` is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

// ============================================================================
// Pure parsing (no I/O)
// ============================================================================

/// Parse a document into an untyped value
fn parse_document(content: &str, format: ConfigFormat) -> Result<Value, ConfigError> {
    match format {
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
        }
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
        }
    }
}

fn from_document(document: Value) -> Result<StackConfig, ConfigError> {
    serde_json::from_value(document).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a stack config document as written, without expansion
pub fn parse_stack_config(content: &str, format: ConfigFormat) -> Result<StackConfig, ConfigError> {
    from_document(parse_document(content, format)?)
}

/// Expand `${VAR}` and `~` in every string value, recursively. Keys are
/// left alone.
pub fn expand_values(value: &Value) -> Result<Value, ConfigError> {
    Ok(match value {
        Value::String(s) => {
            let expanded = shellexpand::full(s).map_err(|e| ConfigError::ExpandError {
                value: s.clone(),
                reason: e.to_string(),
            })?;
            Value::String(expanded.into_owned())
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(expand_values)
                .collect::<Result<Vec<_>, ConfigError>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), expand_values(v)?)))
                .collect::<Result<_, ConfigError>>()?,
        ),
        other => other.clone(),
    })
}

impl DeployEnvironment {
    /// Expand `${VAR}`/`~` in configured values and fill gaps from
    /// `STACKFORGE_ACCOUNT` / `STACKFORGE_REGION`.
    pub fn resolve(&self) -> Result<Self, ConfigError> {
        Ok(Self {
            account: resolve_value(self.account.as_deref(), ACCOUNT_ENV)?,
            region: resolve_value(self.region.as_deref(), REGION_ENV)?,
        })
    }

    /// `account/region`, with `unknown` for gaps
    pub fn describe(&self) -> String {
        format!(
            "{}/{}",
            self.account.as_deref().unwrap_or("unknown"),
            self.region.as_deref().unwrap_or("unknown")
        )
    }
}

fn resolve_value(configured: Option<&str>, fallback_env: &str) -> Result<Option<String>, ConfigError> {
    match configured {
        Some(value) => {
            let expanded = shellexpand::full(value).map_err(|e| ConfigError::ExpandError {
                value: value.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Some(expanded.into_owned()))
        }
        None => Ok(std::env::var(fallback_env).ok().filter(|v| !v.is_empty())),
    }
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Load and parse a stack config file from disk (JSON or YAML by extension)
pub fn load_stack_config(path: &Path) -> Result<StackConfig, ConfigError> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let path = Path::new(&expanded);
    let content = std::fs::read_to_string(path)?;
    let document = parse_document(&content, ConfigFormat::from_path(path))?;
    let config = from_document(expand_values(&document)?)?;
    debug!(path = %path.display(), profile = %config.profile, "loaded stack config");
    Ok(config)
}
