//! # Config Resolver
//!
//! Computes the configuration actually applied to a project from its
//! organization and project layers, with source attribution.
//!
//! # Precedence
//! 1. Project override, when a row exists (returned verbatim)
//! 2. Organization configuration
//! 3. Hard-coded system default
//!
//! Layers are never merged field by field: a project row that leaves
//! `modelRouterConfig` unset resolves to an unset `modelRouterConfig`, not the
//! organization's. Resolution has no failure path; a missing configuration
//! must never block routing.

use rc_core::{
    ConfigSource, EffectiveConfig, FallbackConfig, FallbackMode, ModelRouterConfig,
    OrganizationConfig, ProjectConfig, RoutingSettings, SemanticCacheSettings,
};

pub const DEFAULT_COST_BIAS: f64 = 0.5;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Settings applied when neither the organization nor the project has a row.
#[must_use]
pub fn default_settings() -> RoutingSettings {
    RoutingSettings {
        model_router_config: Some(ModelRouterConfig {
            cost_bias: DEFAULT_COST_BIAS,
            semantic_cache: SemanticCacheSettings {
                enabled: false,
                ..SemanticCacheSettings::default()
            },
        }),
        fallback_config: Some(FallbackConfig {
            mode: FallbackMode::Sequential,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }),
        enabled: true,
    }
}

#[must_use]
pub fn system_default() -> EffectiveConfig {
    EffectiveConfig {
        settings: default_settings(),
        source: ConfigSource::Default,
        config_id: None,
        updated_at: None,
    }
}

/// Resolve the effective configuration of one project.
///
/// # Examples
///
/// ```
/// use rc_core::ConfigSource;
///
/// let effective = resolver::resolve(None, None);
/// assert_eq!(effective.source, ConfigSource::Default);
/// assert_eq!(effective.cost_bias(), Some(0.5));
/// ```
#[must_use]
pub fn resolve(
    organization: Option<&OrganizationConfig>,
    project: Option<&ProjectConfig>,
) -> EffectiveConfig {
    if let Some(project) = project {
        return EffectiveConfig {
            settings: project.settings.clone(),
            source: ConfigSource::Project,
            config_id: Some(project.id.clone()),
            updated_at: Some(project.updated_at),
        };
    }

    if let Some(organization) = organization {
        return EffectiveConfig {
            settings: organization.settings.clone(),
            source: ConfigSource::Organization,
            config_id: Some(organization.id.clone()),
            updated_at: Some(organization.updated_at),
        };
    }

    tracing::debug!("No organization or project configuration, using system default");
    system_default()
}

/// What the next save from a given screen must send to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveIntent {
    /// No row exists at the target scope yet.
    Create,
    /// Update the existing row, guarded by the `updatedAt` it was read at.
    Update {
        config_id: String,
        expected_updated_at: i64,
    },
}

/// Decide create vs update for a project-level save from the configuration
/// currently displayed for that project.
///
/// A displayed configuration inherited from the organization (or the system
/// default) means no project row exists, so the save must be a create.
#[must_use]
pub fn project_save_intent(displayed: &EffectiveConfig) -> SaveIntent {
    match (displayed.source, &displayed.config_id, displayed.updated_at) {
        (ConfigSource::Project, Some(config_id), Some(updated_at)) => SaveIntent::Update {
            config_id: config_id.clone(),
            expected_updated_at: updated_at,
        },
        _ => SaveIntent::Create,
    }
}

/// Decide create vs update for an organization-level save.
#[must_use]
pub fn organization_save_intent(current: Option<&OrganizationConfig>) -> SaveIntent {
    match current {
        Some(config) => SaveIntent::Update {
            config_id: config.id.clone(),
            expected_updated_at: config.updated_at,
        },
        None => SaveIntent::Create,
    }
}

#[cfg(test)]
mod proptests;
