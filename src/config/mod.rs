use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::plugins::DEFAULT_CAPACITY;

/// Largest slot table the host will build
pub const MAX_CAPACITY: usize = 64;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub slots: SlotsConfig,
    #[serde(default)]
    pub repl: ReplConfig,
    /// Plugins loaded at start-up, in order
    #[serde(default)]
    pub autoload: Vec<AutoloadEntry>,
    /// Unload every slot on `quit` instead of exiting with modules mapped
    #[serde(default)]
    pub unload_on_exit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotsConfig {
    /// Number of plugin slots, fixed for the life of the process
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Loading into an occupied slot overwrites it and leaks the old module.
    /// When false the load is refused until the slot is unloaded.
    #[serde(default = "default_true")]
    pub leak_on_overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Where to persist command history; no history file when unset
    #[serde(default)]
    pub history_file: Option<PathBuf>,

    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoloadEntry {
    pub path: PathBuf,
    /// Target slot; the first free slot when omitted
    #[serde(default)]
    pub slot: Option<usize>,
}

// Default value functions
fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_prompt() -> String {
    ">> ".to_string()
}

fn default_max_history() -> usize {
    100
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            leak_on_overwrite: true,
        }
    }
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            history_file: None,
            max_history: default_max_history(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.slotplug/config.yaml`, or defaults
    ///
    /// # Errors
    /// Returns an error if an existing config file cannot be read or parsed
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(&Self::default_config_path()?)
    }

    /// Load `path` if it exists; a missing file means every slot setting
    /// takes its built-in value
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or fails validation
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;

        debug!(
            "Loaded config from {} ({} slots, {} autoload entries)",
            path.display(),
            config.slots.capacity,
            config.autoload.len()
        );
        Ok(config)
    }

    /// Validate and write configuration to `path`
    ///
    /// # Errors
    /// Returns an error if validation or serialization fails or the file
    /// cannot be written
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// `~/.slotplug/config.yaml`
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;

        Ok(home.join(".slotplug").join("config.yaml"))
    }

    /// Reject values the slot table cannot be built with
    ///
    /// # Errors
    /// Returns an error if the capacity is zero or above [`MAX_CAPACITY`]
    pub fn validate(&self) -> Result<()> {
        if self.slots.capacity == 0 || self.slots.capacity > MAX_CAPACITY {
            bail!(
                "slots.capacity must be between 1 and {}, got {}",
                MAX_CAPACITY,
                self.slots.capacity
            );
        }
        if let Some(entry) = self
            .autoload
            .iter()
            .find(|entry| entry.slot.is_some_and(|slot| slot >= self.slots.capacity))
        {
            bail!(
                "autoload entry {} targets slot {:?} outside a table of {} slots",
                entry.path.display(),
                entry.slot,
                self.slots.capacity
            );
        }
        Ok(())
    }
}
