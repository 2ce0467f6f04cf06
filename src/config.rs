//! Configuration for docflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DOCFLOW_HOME, DOCFLOW_MAX_RETRIES)
//! 2. Config file (.docflow/config.yaml)
//! 3. Defaults (~/.docflow, 3 retries)
//!
//! Config file discovery:
//! - Searches current directory and parents for .docflow/config.yaml
//! - Paths in config file are relative to the .docflow/ directory
//!
//! Configuration is loaded explicitly and handed to whoever needs it;
//! nothing is cached process-wide.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::ToolName;

/// Retry budget when nothing else is configured
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Backend for each tool
    #[serde(default)]
    pub tools: BTreeMap<ToolName, ToolBackend>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .docflow/)
    pub home: Option<String>,
}

/// How a tool is reached
///
/// Supports two YAML forms:
/// - Command: `{ command: [program, arg...], timeout_seconds: 30 }`
/// - HTTP: `{ url: "http://host/path", timeout_seconds: 30 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolBackend {
    Command {
        command: Vec<String>,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    Http {
        url: String,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to docflow home (uploads, audit trail)
    pub home: PathBuf,
    /// Retry budget for each job
    pub max_retries: u32,
    /// Tool backends
    pub tools: BTreeMap<ToolName, ToolBackend>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Defaults rooted at `home`, with no tools configured
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            home,
            max_retries: DEFAULT_MAX_RETRIES,
            tools: BTreeMap::new(),
            config_file: None,
        }
    }

    /// Directory uploaded inputs are stored in ($DOCFLOW_HOME/files)
    pub fn files_dir(&self) -> PathBuf {
        self.home.join("files")
    }

    /// Audit trail file ($DOCFLOW_HOME/audit.jsonl)
    pub fn audit_path(&self) -> PathBuf {
        self.home.join("audit.jsonl")
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".docflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine config file, environment overrides and defaults
fn resolve(
    config_file: Option<PathBuf>,
    env_home: Option<String>,
    env_max_retries: Option<String>,
) -> Result<ResolvedConfig> {
    let parsed = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let Some(home_path) = parsed.as_ref().and_then(|c| c.paths.home.as_deref()) {
        let docflow_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(Path::new("."));
        resolve_path(docflow_dir, home_path)
    } else {
        dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".docflow")
    };

    let max_retries = match env_max_retries {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("DOCFLOW_MAX_RETRIES is not a number: {}", raw))?,
        None => parsed
            .as_ref()
            .and_then(|c| c.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES),
    };

    let tools = parsed.map(|c| c.tools).unwrap_or_default();

    Ok(ResolvedConfig {
        home,
        max_retries,
        tools,
        config_file,
    })
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    resolve(
        find_config_file(&cwd),
        std::env::var("DOCFLOW_HOME").ok(),
        std::env::var("DOCFLOW_MAX_RETRIES").ok(),
    )
}
