//! Configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `OQTO_STREAM__*` environment variables
//! (e.g. `OQTO_STREAM__STREAM__FRAME_INTERVAL_MS=33`).

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "oqto-stream";
const ENV_PREFIX: &str = "OQTO_STREAM";

/// Tuning of the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frame tick cadence for coalesced delta commits.
    pub frame_interval_ms: u64,
    /// Events still longer than this after compaction are rejected.
    pub max_event_chars: usize,
    /// String tool results are truncated to this many characters.
    pub max_tool_result_chars: usize,
    /// Per-session bound on tool results waiting for their tool-call block.
    pub max_orphan_results: usize,
    /// How many closed session ids are remembered.
    pub closed_session_memory: usize,
    /// Highest content block index a streamed event may address.
    pub max_content_index: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            max_event_chars: 60_000,
            max_tool_result_chars: 24_000,
            max_orphan_results: 64,
            closed_session_memory: 1024,
            max_content_index: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub stream: StreamConfig,
}

impl AppConfig {
    /// Load from `path` (or the default location) plus the environment.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        Self::load_from(&path, env_source(None))
    }

    fn load_from(path: &Path, env: Environment) -> Result<Self> {
        let built = Config::builder()
            .set_default("logging.level", "info")?
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("loading config from {}", path.display()))?;

        let config: AppConfig = built
            .try_deserialize()
            .context("deserializing configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.frame_interval_ms == 0 {
            return Err(anyhow!("stream.frame_interval_ms must be greater than zero"));
        }
        if self.stream.max_event_chars == 0 {
            return Err(anyhow!("stream.max_event_chars must be greater than zero"));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config to TOML")
    }

    /// Write this config to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {parent:?}"))?;
        }
        let mut body = format!("# Configuration for {APP_NAME}\n# File: {}\n\n", path.display());
        body.push_str(&self.to_toml()?);
        fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
    }
}

/// `OQTO_STREAM__*` variables from `vars`, or from the process when `None`.
fn env_source(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .source(vars)
}

/// `$XDG_CONFIG_HOME/oqto-stream/config.toml`, falling back to the platform
/// config dir and then `~/.config`.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join("config.toml"))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}
