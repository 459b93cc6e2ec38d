//! # Configuration Validation
//!
//! Provides validation for all configuration structures using the `validator` crate.

use crate::config::ClientConfig;
use validator::Validate;

/// Validate configuration structure.
///
/// ## Validation Rules
/// - `cache.stale_time_ms`: 0-3600000
/// - `events.channel_capacity`: 1-4096
/// - `observability.logging_level`: "trace", "debug", "info", "warn" or "error"
pub fn validate(config: &ClientConfig) -> Result<(), validator::ValidationErrors> {
    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;

    #[test]
    fn test_validate_valid_config() {
        let config = ClientConfig::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_stale_time_too_large() {
        let config = ClientConfig {
            cache: CacheSettings {
                stale_time_ms: 3_600_001,
                ..Default::default()
            },
            ..Default::default()
        };
        let errors = validate(&config).unwrap_err();
        assert!(errors.errors().contains_key("cache"));
    }
}
