//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<config_dir>/klangbild/<module_name>.toml`, if it exists
///
/// Returns `None` when no file applies; callers fall back to built-in
/// defaults.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    module_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let default_path = dirs::config_dir()?
        .join("klangbild")
        .join(format!("{}.toml", module_name));
    if default_path.exists() {
        Some(default_path)
    } else {
        debug!("No config file at {}", default_path.display());
        None
    }
}

/// Load a TOML configuration file, or defaults when `path` is `None`
///
/// An explicitly named file that cannot be read is an error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No configuration file, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e))
    })?;

    info!("Loaded TOML configuration from {}", path.display());
    Ok(config)
}

/// Parse `key=value` lines of a properties file
///
/// Blank lines and lines starting with `#` or `!` are skipped. Keys and values
/// are trimmed; the first `=` or `:` separates them.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
        .collect()
}

/// Read a properties file from disk
pub fn read_properties(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read properties file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(parse_properties(&content))
}
