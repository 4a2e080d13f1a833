//! Checkpoint options
//!
//! Options may be loaded from `~/.pgrespawn/config.toml` (or an explicit
//! path); anything missing falls back to its default.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options for [`crate::Checkpoint`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointOptions {
    /// Tables the reset engine must leave alone (`table` or `schema.table`)
    #[serde(default)]
    pub tables_to_ignore: Vec<String>,

    /// Restrict the reset engine to these schemas (empty = all)
    #[serde(default)]
    pub schemas_to_include: Vec<String>,

    /// Schemas the reset engine must skip
    #[serde(default)]
    pub schemas_to_exclude: Vec<String>,

    /// Per-statement timeout in seconds
    #[serde(default)]
    pub command_timeout: Option<u64>,

    /// Create `extensions` on the system database before touching the cache
    #[serde(default)]
    pub auto_create_extensions: bool,

    /// Extensions created when `auto_create_extensions` is set
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["dblink".to_string()]
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        Self {
            tables_to_ignore: Vec::new(),
            schemas_to_include: Vec::new(),
            schemas_to_exclude: Vec::new(),
            command_timeout: None,
            auto_create_extensions: false,
            extensions: default_extensions(),
        }
    }
}

impl CheckpointOptions {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout.map(Duration::from_secs)
    }

    /// Get the config directory path (~/.pgrespawn/)
    pub fn config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".pgrespawn"))
    }
}

/// Load options from `~/.pgrespawn/config.toml`, or defaults if it does not exist
pub fn load_options() -> ConfigResult<CheckpointOptions> {
    let path = CheckpointOptions::config_dir()?.join("config.toml");
    if !path.exists() {
        return Ok(CheckpointOptions::default());
    }
    load_options_from(&path)
}

/// Load options from an explicit file
pub fn load_options_from(path: &Path) -> ConfigResult<CheckpointOptions> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;
    parse_options(&content)
}

fn parse_options(content: &str) -> ConfigResult<CheckpointOptions> {
    let options: CheckpointOptions = toml::from_str(content)?;
    if options.command_timeout == Some(0) {
        return Err(ConfigError::Invalid(
            "command_timeout must be at least 1 second".into(),
        ));
    }
    Ok(options)
}
