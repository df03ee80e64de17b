//! Configuration system
//!
//! Host settings are plain serde structs with sensible defaults. Any of them
//! can be loaded from or saved to TOML or RON, chosen by file extension.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

use crate::platform::ShowHint;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        match Format::of(path)? {
            Format::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Format::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Load configuration from file if it exists, defaults otherwise
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match Format::of(path)? {
            Format::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

enum Format {
    Toml,
    Ron,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Top-level host configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Show hint for the first window when none is given on the command line
    pub show_hint: ShowHint,

    /// Settings for every window the host creates
    pub window: WindowConfig,

    /// Execution context thread settings
    pub context: ContextConfig,

    /// Teardown settings
    pub shutdown: ShutdownConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config for HostConfig {}

/// Window creation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window class registered with the window system
    pub class_name: String,

    /// Title bar text
    pub title: String,

    /// Initial client width in pixels
    pub width: u32,

    /// Initial client height in pixels
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            class_name: String::from("MultiWindowHostWindow"),
            title: String::from("Multi Window Host"),
            width: 800,
            height: 600,
        }
    }
}

/// Execution context thread settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Thread names are `{prefix}-{context id}`
    pub thread_name_prefix: String,

    /// Stack size for context threads; platform default when unset
    pub stack_size: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: String::from("window-context"),
            stack_size: None,
        }
    }
}

/// Teardown settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long the entry point waits for context threads to exit after the
    /// last window closed
    pub join_timeout_ms: u64,
}

impl ShutdownConfig {
    /// Join timeout as a duration
    pub const fn join_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { join_timeout_ms: 5_000 }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
        }
    }
}
