//! Configuration management
//!
//! This module handles loading, saving, and migrating the bfs configuration file.
//! The configuration file is stored in TOML format at ~/.config/bfs/config.toml,
//! or in `$BFS_CONFIG_DIR/config.toml` when that variable is set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::Profile;

/// Current configuration schema version
///
/// Files written with an older version are upgraded by `ConfigManager::migrate`.
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "BFS_CONFIG_DIR";

/// Default output format
const DEFAULT_OUTPUT: &str = "human";

/// Default color setting
const DEFAULT_COLOR: &str = "auto";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Filesystem tuning
    #[serde(default)]
    pub fs: FsConfig,

    /// Configured store profiles
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Default settings for CLI behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output format: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never"
    #[serde(default = "default_color")]
    pub color: String,

    /// Show progress spinners
    #[serde(default = "default_true")]
    pub progress: bool,

    /// Profile used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            progress: true,
            profile: None,
        }
    }
}

/// Tuning of the directory emulation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Page size of directory listings
    pub max_paging_keys: i32,

    /// Copies in flight for a single directory rename
    pub max_concurrent_copy_tasks_per_dir: usize,

    /// Copies in flight across all renames
    pub max_copy_threads: usize,

    /// Uploads and part downloads in flight across all streams
    pub transfer_threads: usize,

    /// Part downloads one reader keeps in flight
    pub max_read_ahead_parts: usize,

    /// Size of a read part in bytes
    pub part_size: u64,

    /// Create fake directories with a conditional PUT instead of check-then-put
    pub put_if_absent: bool,

    /// Initial working directory
    pub working_dir: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            max_paging_keys: 1000,
            max_concurrent_copy_tasks_per_dir: 5,
            max_copy_threads: 25,
            transfer_threads: 10,
            max_read_ahead_parts: 4,
            part_size: 8 * 1024 * 1024,
            put_if_absent: false,
            working_dir: "/".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            fs: FsConfig::default(),
            profiles: Vec::new(),
        }
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("bfs"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade bfs.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        config.fs.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, config: Config) -> Result<Config> {
        let mut config = config;

        // Version 0 files predate the [fs] section, serde defaults fill it in.

        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}

impl FsConfig {
    /// Reject settings that would stall the pools
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("max_paging_keys", self.max_paging_keys <= 0),
            ("max_concurrent_copy_tasks_per_dir", self.max_concurrent_copy_tasks_per_dir == 0),
            ("max_copy_threads", self.max_copy_threads == 0),
            ("transfer_threads", self.transfer_threads == 0),
            ("max_read_ahead_parts", self.max_read_ahead_parts == 0),
            ("part_size", self.part_size == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, bad)| *bad) {
            return Err(Error::Config(format!("fs.{name} must be positive")));
        }
        if !self.working_dir.starts_with('/') {
            return Err(Error::Config(format!(
                "fs.working_dir must be absolute, got '{}'",
                self.working_dir
            )));
        }
        Ok(())
    }
}
