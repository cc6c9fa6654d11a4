use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::models::DEFAULT_TIMEOUT_MS;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// How the local sandbox runs commands.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Shell invocation; the command is appended as the last argument.
    /// Example: "bash -eu -c"
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Parent directory for session sandboxes. Defaults to the system temp dir.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            root: None,
        }
    }
}

fn default_shell() -> String {
    "sh -c".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradingConfig {
    /// Per-command timeout for tests and activities that set none.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive, overridden by `GRADER_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "warn".into()
}

impl Config {
    /// Load `grader.toml` from the workspace root, falling back to defaults if absent or invalid.
    pub fn load(workspace: &Path) -> Self {
        let path = workspace.join("grader.toml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        Self::parse(&content).unwrap_or_default()
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
