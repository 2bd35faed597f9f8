//! tekcheck configuration
//!
//! Settings are stored in `~/.config/tekcheck/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (`TEKCHECK_TASK_DIR`, `TEKCHECK_GIT_REVISION`, `TEKCHECK_CONCURRENCY`)
//! 3. Config file
//! 4. Defaults

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TekError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory searched for Tasks and Pipelines referenced by name
    pub task_dir: Option<PathBuf>,

    pub git: GitSettings,

    pub bundle: BundleSettings,

    pub resolution: ResolutionSettings,

    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitSettings {
    /// Revision used when a git taskRef has none
    pub default_revision: String,

    /// Path or name of the git executable
    pub binary: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            default_revision: "main".to_string(),
            binary: "git".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BundleSettings {
    /// Synthesized when a bundle taskRef has no serviceAccount
    pub service_account: String,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            service_account: "none".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolutionSettings {
    /// Tasks of one pipeline resolved at the same time
    pub concurrency: usize,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchSettings {
    /// Files validated at the same time
    pub concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl Settings {
    /// Get the config directory path
    ///
    /// Returns `~/.config/tekcheck/` on Unix, `%APPDATA%/tekcheck/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tekcheck")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default location
    ///
    /// Returns defaults if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| TekError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| TekError::Config {
            reason: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(dir) = var("TEKCHECK_TASK_DIR") {
            self.task_dir = Some(PathBuf::from(dir));
        }
        if let Some(revision) = var("TEKCHECK_GIT_REVISION") {
            self.git.default_revision = revision;
        }
        if let Some(value) = var("TEKCHECK_CONCURRENCY") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => self.resolution.concurrency = n,
                _ => warn!(%value, "Ignoring invalid TEKCHECK_CONCURRENCY"),
            }
        }

        self
    }
}

/// Parse repeated `key=value` arguments. Keys and values are trimmed; the
/// first `=` separates them and the last occurrence of a key wins.
pub fn parse_params(values: &[String]) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for raw in values {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(TekError::InvalidParamFormat(raw.clone()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(TekError::EmptyParamKey(raw.clone()));
        }
        params.insert(key.to_string(), value.trim().to_string());
    }
    Ok(params)
}
