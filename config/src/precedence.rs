//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)

use crate::config::{
    CacheSettings, ClientConfig, ConfigOverrides, EventsConfig, ObservabilityConfig,
};

/// Merge multiple configuration sources with precedence.
///
/// ## Usage
/// ```rust,no_run
/// use config::{ClientConfig, merge_configs, load_from_file, load_from_env};
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let defaults = ClientConfig::default();
///     let from_file = load_from_file(Path::new("console.toml"))?;
///     let from_env = load_from_env()?;
///
///     let _config = merge_configs(defaults, from_file, "file", from_env, "env", None, "cli");
///     Ok(())
/// }
/// ```
///
/// ## Field Semantics
/// The file layer only overrides a field when its value differs from the
/// built-in default, since an omitted file field deserializes to that
/// default. Environment and CLI layers override every field they set, even
/// to the default value.
pub fn merge_configs(
    defaults: ClientConfig,
    file_config: ClientConfig,
    file_source_name: &str,
    env_overrides: ConfigOverrides,
    env_source_name: &str,
    cli_overrides: Option<ConfigOverrides>,
    cli_source_name: &str,
) -> ClientConfig {
    let mut config = defaults;

    config = merge_with_logging(config, file_config, file_source_name);
    apply_with_logging(&mut config, &env_overrides, env_source_name);

    if let Some(cli) = cli_overrides {
        apply_with_logging(&mut config, &cli, cli_source_name);
    }

    config
}

fn apply_with_logging(config: &mut ClientConfig, overrides: &ConfigOverrides, source_name: &str) {
    let changes = overrides.apply(config);
    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", source_name, changes);
    }
}

fn merge_with_logging(
    mut base: ClientConfig,
    override_config: ClientConfig,
    source_name: &str,
) -> ClientConfig {
    let mut changes = Vec::new();

    merge_cache(&mut base.cache, &override_config.cache, &mut changes);
    merge_events(&mut base.events, &override_config.events, &mut changes);
    merge_observability(
        &mut base.observability,
        &override_config.observability,
        &mut changes,
    );

    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", source_name, changes);
    }

    base
}

fn merge_cache(base: &mut CacheSettings, override_config: &CacheSettings, changes: &mut Vec<String>) {
    let defaults = CacheSettings::default();
    if override_config.stale_time_ms != defaults.stale_time_ms
        && override_config.stale_time_ms != base.stale_time_ms
    {
        changes.push(format!(
            "cache.stale_time_ms = {}",
            override_config.stale_time_ms
        ));
        base.stale_time_ms = override_config.stale_time_ms;
    }
    if override_config.refetch_on_invalidate != defaults.refetch_on_invalidate
        && override_config.refetch_on_invalidate != base.refetch_on_invalidate
    {
        changes.push(format!(
            "cache.refetch_on_invalidate = {}",
            override_config.refetch_on_invalidate
        ));
        base.refetch_on_invalidate = override_config.refetch_on_invalidate;
    }
}

fn merge_events(base: &mut EventsConfig, override_config: &EventsConfig, changes: &mut Vec<String>) {
    if override_config.channel_capacity != EventsConfig::default().channel_capacity
        && override_config.channel_capacity != base.channel_capacity
    {
        changes.push(format!(
            "events.channel_capacity = {}",
            override_config.channel_capacity
        ));
        base.channel_capacity = override_config.channel_capacity;
    }
}

fn merge_observability(
    base: &mut ObservabilityConfig,
    override_config: &ObservabilityConfig,
    changes: &mut Vec<String>,
) {
    let defaults = ObservabilityConfig::default();
    if override_config.logging_level != defaults.logging_level
        && override_config.logging_level != base.logging_level
    {
        changes.push(format!(
            "observability.logging_level = {}",
            override_config.logging_level
        ));
        base.logging_level.clone_from(&override_config.logging_level);
    }
    if override_config.metrics_enabled != defaults.metrics_enabled
        && override_config.metrics_enabled != base.metrics_enabled
    {
        changes.push(format!(
            "observability.metrics_enabled = {}",
            override_config.metrics_enabled
        ));
        base.metrics_enabled = override_config.metrics_enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_cache() {
        let mut base = CacheSettings::default();
        let override_config = CacheSettings {
            stale_time_ms: 10,
            refetch_on_invalidate: false,
        };

        let mut changes = Vec::new();
        merge_cache(&mut base, &override_config, &mut changes);

        assert_eq!(base.stale_time_ms, 10);
        assert!(!base.refetch_on_invalidate);
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_unset_env_keeps_file_values() {
        let file_config = ClientConfig {
            cache: CacheSettings {
                stale_time_ms: 1_000,
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = merge_configs(
            ClientConfig::default(),
            file_config,
            "file",
            ConfigOverrides::default(),
            "env",
            None,
            "cli",
        );

        assert_eq!(merged.cache.stale_time_ms, 1_000);
    }

    #[test]
    fn test_env_set_to_default_beats_file() {
        let file_config = ClientConfig {
            cache: CacheSettings {
                stale_time_ms: 500,
                refetch_on_invalidate: false,
            },
            ..Default::default()
        };
        let env_overrides = ConfigOverrides {
            stale_time_ms: Some(30_000),
            refetch_on_invalidate: Some(true),
            ..Default::default()
        };

        let merged = merge_configs(
            ClientConfig::default(),
            file_config,
            "file",
            env_overrides,
            "env",
            None,
            "cli",
        );

        assert_eq!(merged.cache.stale_time_ms, 30_000);
        assert!(merged.cache.refetch_on_invalidate);
    }

    #[test]
    fn test_merge_cli_overrides_all() {
        let file_config = ClientConfig {
            observability: ObservabilityConfig {
                logging_level: "warn".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let env_overrides = ConfigOverrides {
            logging_level: Some("debug".to_string()),
            ..Default::default()
        };
        let cli_overrides = ConfigOverrides {
            logging_level: Some("info".to_string()),
            ..Default::default()
        };

        let merged = merge_configs(
            ClientConfig::default(),
            file_config,
            "file",
            env_overrides,
            "env",
            Some(cli_overrides),
            "cli",
        );

        assert_eq!(merged.observability.logging_level, "info");
    }
}
