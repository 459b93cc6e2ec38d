//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! - `RC_CACHE_*`: Query cache settings
//! - `RC_EVENT_*`: Invalidation event settings
//! - `RC_LOG_LEVEL`, `RC_METRICS_ENABLED`: Observability settings

use crate::config::ConfigOverrides;
use std::env;

/// Load configuration overrides from environment variables.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let overrides = load_from_env()?;
///     if let Some(stale) = overrides.stale_time_ms {
///         println!("Stale after: {stale}ms");
///     }
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// - `RC_CACHE_STALE_TIME_MS`: Freshness window
/// - `RC_CACHE_REFETCH_ON_INVALIDATE`: true/false
/// - `RC_EVENT_CHANNEL_CAPACITY`: Broadcast buffer
/// - `RC_LOG_LEVEL`: trace/debug/info/warn/error
/// - `RC_METRICS_ENABLED`: true/false
///
/// Unset variables stay `None`; set but unparsable variables are an error.
pub fn load_from_env() -> Result<ConfigOverrides, Box<dyn std::error::Error>> {
    Ok(ConfigOverrides {
        stale_time_ms: parse_env_opt("RC_CACHE_STALE_TIME_MS")?,
        refetch_on_invalidate: parse_env_opt("RC_CACHE_REFETCH_ON_INVALIDATE")?,
        channel_capacity: parse_env_opt("RC_EVENT_CHANNEL_CAPACITY")?,
        logging_level: env::var("RC_LOG_LEVEL").ok(),
        metrics_enabled: parse_env_opt("RC_METRICS_ENABLED")?,
    })
}

fn parse_env<T>(key: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(s) => s
            .parse::<T>()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error>),
    }
}

fn parse_env_opt<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if env::var_os(key).is_none() {
        return Ok(None);
    }
    parse_env(key)
        .map(Some)
        .map_err(|e| format!("{key}: {e}").into())
}
