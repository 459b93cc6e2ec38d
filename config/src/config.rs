//! # Configuration Structures
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation
//! - Fall back to defaults for every omitted field

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level client settings.
///
/// ## Usage
/// ```rust,no_run
/// use config::ClientConfig;
///
/// let config = ClientConfig::default();
/// println!("Stale after: {}ms", config.cache.stale_time_ms);
/// ```
///
/// ## Fields
/// - `cache`: query cache freshness and invalidation behaviour
/// - `events`: config-invalidation event buffering
/// - `observability`: logging level and metrics toggle
///
/// ## Validation
/// All nested configurations must pass their own validation rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheSettings,

    #[serde(default)]
    #[validate(nested)]
    pub events: EventsConfig,

    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// Query cache settings.
///
/// ## Fields
/// - `stale_time_ms`: age after which a fresh entry is refetched on the next
///   read (default: 30000)
/// - `refetch_on_invalidate`: refetch cached entries immediately when they
///   are invalidated; when false they are only marked stale (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CacheSettings {
    #[serde(default = "default_stale_time_ms")]
    #[validate(range(max = 3600000))]
    pub stale_time_ms: u64,

    #[serde(default = "default_refetch_on_invalidate")]
    pub refetch_on_invalidate: bool,
}

fn default_stale_time_ms() -> u64 {
    30_000
}

fn default_refetch_on_invalidate() -> bool {
    true
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
            refetch_on_invalidate: default_refetch_on_invalidate(),
        }
    }
}

/// Invalidation event settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct EventsConfig {
    /// Broadcast buffer; slow subscribers lag past this many events.
    #[serde(default = "default_channel_capacity")]
    #[validate(range(min = 1, max = 4096))]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Observability settings.
///
/// ## Fields
/// - `logging_level`: trace/debug/info/warn/error (default: "info")
/// - `metrics_enabled`: record cache and mutation metrics (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    #[serde(default = "default_logging_level")]
    #[validate(custom(function = "validate_logging_level"))]
    pub logging_level: String,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn validate_logging_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level")),
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging_level: default_logging_level(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Fields one configuration layer sets explicitly.
///
/// Environment and CLI layers produce this instead of a full
/// [`ClientConfig`], so a value equal to the default still overrides the
/// file below it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub stale_time_ms: Option<u64>,
    pub refetch_on_invalidate: Option<bool>,
    pub channel_capacity: Option<usize>,
    pub logging_level: Option<String>,
    pub metrics_enabled: Option<bool>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every set field into `config`, returning a description of
    /// each change.
    pub fn apply(&self, config: &mut ClientConfig) -> Vec<String> {
        let mut changes = Vec::new();
        if let Some(value) = self.stale_time_ms {
            config.cache.stale_time_ms = value;
            changes.push(format!("cache.stale_time_ms = {value}"));
        }
        if let Some(value) = self.refetch_on_invalidate {
            config.cache.refetch_on_invalidate = value;
            changes.push(format!("cache.refetch_on_invalidate = {value}"));
        }
        if let Some(value) = self.channel_capacity {
            config.events.channel_capacity = value;
            changes.push(format!("events.channel_capacity = {value}"));
        }
        if let Some(value) = &self.logging_level {
            config.observability.logging_level.clone_from(value);
            changes.push(format!("observability.logging_level = {value}"));
        }
        if let Some(value) = self.metrics_enabled {
            config.observability.metrics_enabled = value;
            changes.push(format!("observability.metrics_enabled = {value}"));
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.cache.stale_time_ms, 30_000);
        assert!(config.cache.refetch_on_invalidate);
        assert_eq!(config.events.channel_capacity, 64);
        assert_eq!(config.observability.logging_level, "info");
        assert!(config.observability.metrics_enabled);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_value(serde_json::json!({"cache": {"stale_time_ms": 5}})).unwrap();
        assert_eq!(config.cache.stale_time_ms, 5);
        assert!(config.cache.refetch_on_invalidate);
        assert_eq!(config.events, EventsConfig::default());
    }

    #[test]
    fn test_invalid_logging_level() {
        let config = ClientConfig {
            observability: ObservabilityConfig {
                logging_level: "verbose".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let config = ClientConfig {
            events: EventsConfig {
                channel_capacity: 0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_apply_default_values() {
        let mut config = ClientConfig {
            cache: CacheSettings {
                stale_time_ms: 500,
                refetch_on_invalidate: false,
            },
            ..Default::default()
        };
        let overrides = ConfigOverrides {
            stale_time_ms: Some(30_000),
            refetch_on_invalidate: Some(true),
            ..Default::default()
        };

        let changes = overrides.apply(&mut config);

        assert_eq!(config.cache, CacheSettings::default());
        assert_eq!(changes.len(), 2);
        assert!(ConfigOverrides::default().is_empty());
    }
}
