//! Provisioning contexts
//!
//! A context names where `deploy`/`destroy` send a stack: a remote
//! provisioning endpoint, or the built-in `local` context that keeps
//! deployment records in a state directory. Contexts live in
//! `~/.stackforge/config` (YAML).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the built-in offline context
pub const LOCAL_CONTEXT: &str = "local";

fn stackforge_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stackforge")
}

/// Default config file location: ~/.stackforge/config
pub fn default_config_path() -> PathBuf {
    stackforge_home().join("config")
}

/// Default state directory of the local context: ~/.stackforge/state
pub fn default_state_dir() -> PathBuf {
    stackforge_home().join("state")
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("Context name '{0}' is reserved")]
    ReservedName(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A remote provisioning endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    /// Base URL of the endpoint (e.g. "https://provision.example.com")
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The complete configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(rename = "current-context")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    #[serde(default)]
    pub contexts: HashMap<String, Context>,

    #[serde(default)]
    pub local: LocalConfig,
}

/// Settings of the built-in `local` context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Where deployment records are kept; `~` is expanded
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

/// Where a resolved context sends stacks
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisioningTarget {
    Local { state_dir: PathBuf },
    Remote { url: String, api_key: Option<String> },
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

pub fn parse_config(content: &str) -> Result<Config, ContextError> {
    serde_yaml::from_str(content).map_err(|e| ContextError::ParseError(e.to_string()))
}

pub fn serialize_config(config: &Config) -> Result<String, ContextError> {
    serde_yaml::to_string(config).map_err(|e| ContextError::WriteError(e.to_string()))
}

/// Add or update a context
pub fn add_context(config: &mut Config, context: Context) -> Result<(), ContextError> {
    if context.name == LOCAL_CONTEXT {
        return Err(ContextError::ReservedName(context.name));
    }
    config.contexts.insert(context.name.clone(), context);
    Ok(())
}

/// Remove a context; clears the current context if it was the removed one
pub fn remove_context(config: &mut Config, name: &str) -> Option<Context> {
    let removed = config.contexts.remove(name);
    if config.current_context.as_deref() == Some(name) {
        config.current_context = None;
    }
    removed
}

pub fn set_current_context(config: &mut Config, name: &str) -> Result<(), ContextError> {
    if !config.contexts.contains_key(name) && name != LOCAL_CONTEXT {
        return Err(ContextError::ContextNotFound(name.to_string()));
    }
    config.current_context = Some(name.to_string());
    Ok(())
}

impl Config {
    /// Name of the current context; `local` when none is set
    pub fn current_name(&self) -> &str {
        self.current_context.as_deref().unwrap_or(LOCAL_CONTEXT)
    }

    /// Resolve a context by name, or the current one when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> Result<ProvisioningTarget, ContextError> {
        match name.unwrap_or_else(|| self.current_name()) {
            LOCAL_CONTEXT => Ok(ProvisioningTarget::Local {
                state_dir: PathBuf::from(
                    shellexpand::tilde(&self.local.state_dir.to_string_lossy()).into_owned(),
                ),
            }),
            other => self
                .contexts
                .get(other)
                .map(|ctx| ProvisioningTarget::Remote {
                    url: ctx.url.trim_end_matches('/').to_string(),
                    api_key: ctx.api_key.clone(),
                })
                .ok_or_else(|| ContextError::ContextNotFound(other.to_string())),
        }
    }
}

impl Context {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            api_key: None,
            description: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load config from a path; a missing file yields the default config
pub fn load_config_from(path: &Path) -> Result<Config, ContextError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ContextError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_config(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
