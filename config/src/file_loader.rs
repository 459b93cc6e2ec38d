//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files.
//!
//! Supports automatic format detection based on file extension. The generic
//! `load_document` entry point is shared with other file-backed documents
//! (e.g. seed snapshots read by the CLI).

use crate::config::ClientConfig;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Configuration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),
}

fn read(path: &Path) -> Result<String, ConfigFileError> {
    std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))
}

/// Load client settings from a TOML file.
///
/// ## Error Handling
/// Returns `ConfigFileError` for:
/// - File not found
/// - Invalid TOML syntax
pub fn load_from_toml(path: &Path) -> Result<ClientConfig, ConfigFileError> {
    toml::from_str(&read(path)?).map_err(|e| ConfigFileError::TomlParse(e.to_string()))
}

/// Load client settings from a YAML file.
pub fn load_from_yaml(path: &Path) -> Result<ClientConfig, ConfigFileError> {
    serde_yaml::from_str(&read(path)?).map_err(|e| ConfigFileError::YamlParse(e.to_string()))
}

/// Load client settings from file with auto-detection.
///
/// ## Supported Formats
/// - `.toml`: TOML format
/// - `.yaml`: YAML format
/// - `.yml`: YAML format
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_file;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_file(Path::new("console.yaml"))?;
///     Ok(())
/// }
/// ```
pub fn load_from_file(path: &Path) -> Result<ClientConfig, ConfigFileError> {
    load_document(path)
}

/// Load any deserializable document from a TOML or YAML file, detected by
/// extension.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    match extension.to_lowercase().as_str() {
        "toml" => {
            toml::from_str(&read(path)?).map_err(|e| ConfigFileError::TomlParse(e.to_string()))
        }
        "yaml" | "yml" => serde_yaml::from_str(&read(path)?)
            .map_err(|e| ConfigFileError::YamlParse(e.to_string())),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string())),
    }
}
