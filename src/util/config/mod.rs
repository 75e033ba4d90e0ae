//! flowrt configuration
//!
//! # Lookup order
//!
//! ```text
//! 1. Explicit path (CLI --config)
//! 2. FLOWRT_CONFIG environment variable
//! 3. $XDG_CONFIG_HOME/flowrt/config.toml
//! 4. ~/.config/flowrt/config.toml (%APPDATA%\flowrt on Windows)
//! 5. Default values
//! ```
//!
//! An explicitly named file must exist; the implicit locations are skipped
//! when absent.
//!
//! # Example
//!
//! ```toml
//! [apartment]
//! num_workers = 8
//!
//! [flow]
//! concurrency_limit = 4
//!
//! [log]
//! level = "debug"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runtime::apartment::ApartmentConfig;
use crate::runtime::error::FlowError;
use crate::runtime::flow::FlowConfig;
use crate::util::logger::LogConfig;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "FLOWRT_CONFIG";

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Default thread pool settings
    #[serde(default)]
    pub apartment: ApartmentConfig,
    /// Task flow settings
    #[serde(default)]
    pub flow: FlowConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config parse error in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid config in {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: FlowError,
    },
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Cannot determine config directory")]
    NoConfigDir,
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("flowrt"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("flowrt"));
    }

    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("flowrt"));
    }

    None
}

/// Get the user config file path
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load configuration following the lookup order above.
pub fn load_config(explicit: Option<&Path>) -> Result<RuntimeConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return load_from_path(Path::new(&path));
    }
    match get_config_path() {
        Some(path) if path.exists() => load_from_path(&path),
        _ => {
            debug!("no configuration file found, using defaults");
            Ok(RuntimeConfig::default())
        }
    }
}

/// Load configuration from `path`.
pub fn load_from_path(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RuntimeConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.flow.validate().map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Save configuration to `path`, creating parent directories.
pub fn save_to_path(
    config: &RuntimeConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_error)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content).map_err(io_error)?;
    Ok(())
}

/// Save configuration to the user config path.
pub fn save_user_config(config: &RuntimeConfig) -> Result<PathBuf, ConfigError> {
    let path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to_path(config, &path)?;
    Ok(path)
}
