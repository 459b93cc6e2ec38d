use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use validator::Validate;

/// Parameter name carrying the organization id in cache keys and RPC filters.
pub const ORGANIZATION_PARAM: &str = "organizationId";
/// Parameter name carrying the project id in cache keys and RPC filters.
pub const PROJECT_PARAM: &str = "projectId";
/// Parameter name carrying the provider connection id.
pub const PROVIDER_PARAM: &str = "providerId";

const MAX_ID_LEN: usize = 100;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Option<Self> {
                let id = id.into();
                if id.is_empty() || id.len() > MAX_ID_LEN {
                    None
                } else {
                    Some(Self(id))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s).ok_or_else(|| anyhow::anyhow!(concat!("Invalid ", $label)))
            }
        }
    };
}

string_id!(
    /// Identifier of a tenant organization.
    OrganizationId,
    "organization ID"
);
string_id!(
    /// Identifier of a project inside an organization.
    ProjectId,
    "project ID"
);
string_id!(
    /// Identifier of the acting user, stamped into `createdBy`/`updatedBy`.
    UserId,
    "user ID"
);

impl Default for UserId {
    fn default() -> Self {
        Self("system".to_string())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackMode {
    #[default]
    Sequential,
    Parallel,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SemanticCacheSettings {
    pub enabled: bool,
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f64,
    pub ttl_seconds: u64,
}

impl Default for SemanticCacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            similarity_threshold: 0.95,
            ttl_seconds: 3600,
        }
    }
}

/// Model router tuning: how strongly routing favours cheap models, and the
/// semantic response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModelRouterConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub cost_bias: f64,
    #[serde(default)]
    #[validate(nested)]
    pub semantic_cache: SemanticCacheSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FallbackConfig {
    #[serde(default)]
    pub mode: FallbackMode,
    #[validate(range(min = 1, max = 600000))]
    pub timeout_ms: u64,
    #[validate(range(max = 10))]
    pub max_retries: u32,
}

/// The configuration fields shared by organization and project records.
///
/// Both groups are optional on a record. A record that leaves one unset
/// still supersedes the other layer entirely; nothing is inherited per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSettings {
    #[serde(default)]
    #[validate(nested)]
    pub model_router_config: Option<ModelRouterConfig>,
    #[serde(default)]
    #[validate(nested)]
    pub fallback_config: Option<FallbackConfig>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            model_router_config: None,
            fallback_config: None,
            enabled: true,
        }
    }
}

/// Organization-scoped configuration row. At most one per organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationConfig {
    #[serde(default)]
    pub id: String,
    pub organization_id: OrganizationId,
    #[serde(flatten)]
    pub settings: RoutingSettings,
    #[serde(default)]
    pub created_by: UserId,
    #[serde(default)]
    pub updated_by: UserId,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Project-scoped override row. Absence means the project inherits its
/// organization's configuration in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub id: String,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    #[serde(flatten)]
    pub settings: RoutingSettings,
    #[serde(default)]
    pub created_by: UserId,
    #[serde(default)]
    pub updated_by: UserId,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Which layer produced an effective configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfigSource {
    Organization,
    Project,
    Default,
}

/// Derived configuration actually applied to a project. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    #[serde(flatten)]
    pub settings: RoutingSettings,
    pub source: ConfigSource,
    /// Row id of the record the configuration came from; `None` for the
    /// system default.
    pub config_id: Option<String>,
    pub updated_at: Option<i64>,
}

impl EffectiveConfig {
    pub fn cost_bias(&self) -> Option<f64> {
        self.settings
            .model_router_config
            .as_ref()
            .map(|router| router.cost_bias)
    }

    pub fn is_inherited(&self) -> bool {
        self.source != ConfigSource::Project
    }
}

/// An upstream model provider connection owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConnection {
    #[serde(default)]
    pub id: String,
    pub organization_id: OrganizationId,
    #[validate(length(min = 1, max = 100))]
    pub provider: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[validate(range(max = 1000))]
    pub priority: u32,
    pub enabled: bool,
    #[serde(default)]
    pub created_by: UserId,
    #[serde(default)]
    pub updated_by: UserId,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Toggle,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    OrganizationConfig,
    ProjectConfig,
    EffectiveConfig,
    ProviderConnection,
    ConfigHistory,
    ProviderHistory,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryShape {
    Single,
    List,
}

/// Ordered parameter set addressing a resource or filtering a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceParams(BTreeMap<String, String>);

impl ResourceParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.get(ORGANIZATION_PARAM).and_then(|id| OrganizationId::new(id))
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.get(PROJECT_PARAM).and_then(|id| ProjectId::new(id))
    }

    /// True when every parameter in `subset` is present here with the same value.
    pub fn contains(&self, subset: &ResourceParams) -> bool {
        subset
            .0
            .iter()
            .all(|(name, value)| self.0.get(name) == Some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl std::fmt::Display for ResourceParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{{{joined}}}")
    }
}

/// Address of one cache entry: `(resourceKind, resourceParams)` plus whether
/// the entry holds a single entity or a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub shape: QueryShape,
    pub params: ResourceParams,
}

impl CacheKey {
    pub fn single(kind: ResourceKind, params: ResourceParams) -> Self {
        Self {
            kind,
            shape: QueryShape::Single,
            params,
        }
    }

    pub fn list(kind: ResourceKind, params: ResourceParams) -> Self {
        Self {
            kind,
            shape: QueryShape::List,
            params,
        }
    }

    pub fn organization_config(organization_id: &OrganizationId) -> Self {
        Self::single(
            ResourceKind::OrganizationConfig,
            ResourceParams::new().with(ORGANIZATION_PARAM, organization_id.as_str()),
        )
    }

    pub fn project_config(organization_id: &OrganizationId, project_id: &ProjectId) -> Self {
        Self::single(
            ResourceKind::ProjectConfig,
            ResourceParams::new()
                .with(ORGANIZATION_PARAM, organization_id.as_str())
                .with(PROJECT_PARAM, project_id.as_str()),
        )
    }

    pub fn project_configs(organization_id: &OrganizationId) -> Self {
        Self::list(
            ResourceKind::ProjectConfig,
            ResourceParams::new().with(ORGANIZATION_PARAM, organization_id.as_str()),
        )
    }

    pub fn effective_config(organization_id: &OrganizationId, project_id: &ProjectId) -> Self {
        Self::single(
            ResourceKind::EffectiveConfig,
            ResourceParams::new()
                .with(ORGANIZATION_PARAM, organization_id.as_str())
                .with(PROJECT_PARAM, project_id.as_str()),
        )
    }

    pub fn provider(organization_id: &OrganizationId, provider_id: &str) -> Self {
        Self::single(
            ResourceKind::ProviderConnection,
            ResourceParams::new()
                .with(ORGANIZATION_PARAM, organization_id.as_str())
                .with(PROVIDER_PARAM, provider_id),
        )
    }

    pub fn providers(organization_id: &OrganizationId) -> Self {
        Self::list(
            ResourceKind::ProviderConnection,
            ResourceParams::new().with(ORGANIZATION_PARAM, organization_id.as_str()),
        )
    }

    pub fn config_history(organization_id: &OrganizationId) -> Self {
        Self::list(
            ResourceKind::ConfigHistory,
            ResourceParams::new().with(ORGANIZATION_PARAM, organization_id.as_str()),
        )
    }

    pub fn provider_history(organization_id: &OrganizationId) -> Self {
        Self::list(
            ResourceKind::ProviderHistory,
            ResourceParams::new().with(ORGANIZATION_PARAM, organization_id.as_str()),
        )
    }

    pub fn matches(&self, pattern: &KeyPattern) -> bool {
        self.kind == pattern.kind
            && pattern.shape.is_none_or(|shape| shape == self.shape)
            && self.params.contains(&pattern.params)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}{}", self.kind, self.shape, self.params)
    }
}

/// Selects a family of cache entries: every key of `kind` (optionally of one
/// shape) whose params include all of `params`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    pub kind: ResourceKind,
    pub shape: Option<QueryShape>,
    pub params: ResourceParams,
}

impl KeyPattern {
    pub fn kind(kind: ResourceKind) -> Self {
        Self {
            kind,
            shape: None,
            params: ResourceParams::new(),
        }
    }

    pub fn exact(key: &CacheKey) -> Self {
        Self {
            kind: key.kind,
            shape: Some(key.shape),
            params: key.params.clone(),
        }
    }

    pub fn with_shape(mut self, shape: QueryShape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params = self.params.with(name, value);
        self
    }

    /// Every effective-config entry of every project under an organization.
    pub fn effective_configs_of(organization_id: &OrganizationId) -> Self {
        Self::kind(ResourceKind::EffectiveConfig)
            .with_param(ORGANIZATION_PARAM, organization_id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistorySource {
    Config,
    Provider,
}

/// Uniform audit row shown in history views, projected from heterogeneous
/// history records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub action: String,
    pub changes: serde_json::Value,
    pub changed_by: String,
    pub changed_at: i64,
    pub entity_type: String,
    pub entity_id: String,
}

/// Emitted whenever an organization or project configuration write commits,
/// so downstream consumers (e.g. a routing engine) can refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConfigEvent {
    #[serde(rename_all = "camelCase")]
    OrganizationConfigChanged {
        organization_id: OrganizationId,
        operation: MutationKind,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    ProjectConfigChanged {
        organization_id: OrganizationId,
        project_id: ProjectId,
        operation: MutationKind,
        timestamp: i64,
    },
}

impl ConfigEvent {
    #[must_use]
    pub fn organization_id(&self) -> &OrganizationId {
        match self {
            ConfigEvent::OrganizationConfigChanged {
                organization_id, ..
            } => organization_id,
            ConfigEvent::ProjectConfigChanged {
                organization_id, ..
            } => organization_id,
        }
    }

    #[must_use]
    pub fn operation(&self) -> MutationKind {
        match self {
            ConfigEvent::OrganizationConfigChanged { operation, .. } => *operation,
            ConfigEvent::ProjectConfigChanged { operation, .. } => *operation,
        }
    }

    /// Whether a consumer of `project_id` under this event's organization
    /// must refresh.
    #[must_use]
    pub fn affects_project(&self, project_id: &ProjectId) -> bool {
        match self {
            ConfigEvent::OrganizationConfigChanged { .. } => true,
            ConfigEvent::ProjectConfigChanged {
                project_id: changed, ..
            } => changed == project_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrganizationId {
        OrganizationId::new("org-x").unwrap()
    }

    fn project(id: &str) -> ProjectId {
        ProjectId::new(id).unwrap()
    }

    #[test]
    fn test_id_rejects_empty_and_oversized() {
        assert!(OrganizationId::new("").is_none());
        assert!(ProjectId::new("p".repeat(101)).is_none());
        assert!(UserId::new("alice").is_some());
        assert!("".parse::<OrganizationId>().is_err());
    }

    #[test]
    fn test_project_config_serializes_camel_case_flattened() {
        let config = ProjectConfig {
            id: "pc-1".to_string(),
            organization_id: org(),
            project_id: project("p"),
            settings: RoutingSettings {
                model_router_config: Some(ModelRouterConfig {
                    cost_bias: 0.8,
                    semantic_cache: SemanticCacheSettings::default(),
                }),
                fallback_config: None,
                enabled: true,
            },
            created_by: UserId::default(),
            updated_by: UserId::default(),
            created_at: 1,
            updated_at: 2,
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["projectId"], "p");
        assert_eq!(json["modelRouterConfig"]["costBias"], 0.8);
        assert!(json["fallbackConfig"].is_null());

        let back: ProjectConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_settings_validation_rejects_out_of_range_cost_bias() {
        let settings = RoutingSettings {
            model_router_config: Some(ModelRouterConfig {
                cost_bias: 1.5,
                semantic_cache: SemanticCacheSettings::default(),
            }),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_key_matches_pattern_by_param_subset() {
        let p1 = CacheKey::effective_config(&org(), &project("p1"));
        let other_org =
            CacheKey::effective_config(&OrganizationId::new("org-y").unwrap(), &project("p1"));
        let pattern = KeyPattern::effective_configs_of(&org());

        assert!(p1.matches(&pattern));
        assert!(!other_org.matches(&pattern));
        assert!(!CacheKey::project_config(&org(), &project("p1")).matches(&pattern));
    }

    #[test]
    fn test_exact_pattern_distinguishes_shape() {
        let list = CacheKey::project_configs(&org());
        let single = CacheKey::project_config(&org(), &project("p1"));
        assert!(list.matches(&KeyPattern::exact(&list)));
        assert!(!single.matches(&KeyPattern::exact(&list)));
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::project_config(&org(), &project("p1"));
        assert_eq!(
            key.to_string(),
            "project_config:single{organizationId=org-x,projectId=p1}"
        );
    }

    #[test]
    fn test_event_affects_project() {
        let org_event = ConfigEvent::OrganizationConfigChanged {
            organization_id: org(),
            operation: MutationKind::Update,
            timestamp: 0,
        };
        let project_event = ConfigEvent::ProjectConfigChanged {
            organization_id: org(),
            project_id: project("p1"),
            operation: MutationKind::Create,
            timestamp: 0,
        };

        assert!(org_event.affects_project(&project("p2")));
        assert!(project_event.affects_project(&project("p1")));
        assert!(!project_event.affects_project(&project("p2")));
        assert_eq!(project_event.operation(), MutationKind::Create);
    }
}
