//! Engine Configuration
//!
//! Settings that change how the dispatch core behaves at run time. Every
//! section has defaults, so a configuration file only needs the keys it
//! wants to change.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing of message and handler entry/exit.
    pub watch: WatchConfig,

    /// Slot constraint checking.
    pub constraints: ConstraintConfig,

    /// Class definition behavior.
    pub classes: ClassConfig,
}

/// Watch settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Emit an event for every message send and return.
    pub messages: bool,

    /// Emit an event for every handler entry and exit. Applies to handlers
    /// defined after the setting takes effect.
    pub handlers: bool,
}

/// Constraint checking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Check constant slot writes in handler bodies when the handler is defined.
    pub static_checking: bool,

    /// Check every slot write against the slot's allowed types at run time.
    pub dynamic_checking: bool,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            static_checking: true,
            dynamic_checking: true,
        }
    }
}

/// Class definition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    /// Generate `get-<slot>` / `put-<slot>` handlers when a class is defined.
    pub create_accessors: bool,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            create_accessors: true,
        }
    }
}

impl Config {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
