//! Configuration file loading
//!
//! Config structs live with the crates that own them; this module only knows
//! how to turn a TOML, YAML or JSON document into one of them and back.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Pick a format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| Error::Configuration(format!("No file extension on {}", path.display())))?;
        match ext.as_str() {
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            other => Err(Error::Configuration(format!("Unsupported config format: .{}", other))),
        }
    }
}

/// Parse a config document
pub fn parse<T: DeserializeOwned>(raw: &str, format: ConfigFormat) -> Result<T> {
    match format {
        ConfigFormat::Toml => toml::from_str(raw).map_err(|e| Error::Deserialization(e.to_string())),
        ConfigFormat::Yaml => serde_yaml::from_str(raw).map_err(|e| Error::Deserialization(e.to_string())),
        ConfigFormat::Json => serde_json::from_str(raw).map_err(|e| Error::Deserialization(e.to_string())),
    }
}

/// Render a config value in the given format
pub fn render<T: Serialize>(value: &T, format: ConfigFormat) -> Result<String> {
    match format {
        ConfigFormat::Toml => toml::to_string_pretty(value).map_err(|e| Error::Serialization(e.to_string())),
        ConfigFormat::Yaml => serde_yaml::to_string(value).map_err(|e| Error::Serialization(e.to_string())),
        ConfigFormat::Json => serde_json::to_string_pretty(value).map_err(|e| Error::Serialization(e.to_string())),
    }
}

/// Read and parse a config file, choosing the format by extension
pub fn load_from_path<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let raw = std::fs::read_to_string(path)?;
    parse(&raw, format)
}
