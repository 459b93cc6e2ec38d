//! # Configuration System
//!
//! Client-side settings for the routing configuration console: query cache
//! behaviour, invalidation event buffering and observability.
//!
//! This crate provides:
//! - Configuration structures
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (CLI > env > file > defaults)
//! - Configuration validation
//!
//! The routing configuration that organizations and projects edit is data,
//! not settings; it lives in `rc_core`.

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;
pub mod validation;

pub use config::{
    CacheSettings, ClientConfig, ConfigOverrides, EventsConfig, ObservabilityConfig,
};
pub use file_loader::{
    ConfigFileError, load_document, load_from_file, load_from_toml, load_from_yaml,
};
pub use loader::load_from_env;
pub use precedence::merge_configs;
pub use validation::validate;
