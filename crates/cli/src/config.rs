//! Configuration loading from sqlchat.toml.

use mcp::ServerConfig;
use policy::Policy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the tool host executable shipped alongside `sqlchat`.
pub const HOST_BIN: &str = "sqlchat-host";

/// Top-level configuration.
///
/// Every field has a default, so an absent file and an empty file are the same.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Existing SQLite file the tool host serves.
    pub database: PathBuf,
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub host: HostConfig,
    /// Statement kinds the tool host refuses.
    pub policy: Policy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("database.db"),
            backend: BackendConfig::default(),
            session: SessionConfig::default(),
            host: HostConfig::default(),
            policy: Policy::permissive(),
        }
    }
}

/// Model provider configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: runtime::DEFAULT_MODEL.to_string(),
            max_tokens: runtime::DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tool rounds allowed per user turn.
    pub max_tool_rounds: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: runtime::DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// How the tool host process is launched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host executable; defaults to `sqlchat-host` next to this binary.
    pub command: Option<PathBuf>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: mcp::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load configuration if the file exists, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Replace the configured model; blank values are ignored.
    pub fn override_model(&mut self, model: Option<String>) {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.backend.model = model;
        }
    }

    /// Launch parameters for the tool host.
    pub fn host_server(&self) -> Result<ServerConfig, ConfigError> {
        let command = self.host.resolve_command()?;
        let mut server = ServerConfig::new("sqlite", command.display().to_string())
            .arg("--database")
            .arg(self.database.display().to_string())
            .timeout(Duration::from_secs(self.host.timeout_secs));
        for kind in &self.policy.deny {
            server = server.arg("--deny").arg(kind.as_str());
        }
        Ok(server)
    }
}

impl HostConfig {
    /// The configured command, or the host binary beside the running executable.
    pub fn resolve_command(&self) -> Result<PathBuf, ConfigError> {
        if let Some(command) = &self.command {
            return Ok(command.clone());
        }
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| ConfigError::HostNotFound(exe.clone()))?;
        Ok(dir.join(format!("{HOST_BIN}{}", std::env::consts::EXE_SUFFIX)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("cannot locate {HOST_BIN} next to {0}; set host.command")]
    HostNotFound(PathBuf),
}
