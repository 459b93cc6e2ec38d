use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rc_core::{
    FallbackConfig, FallbackMode, IdentityProvider, ModelRouterConfig, OrganizationConfig,
    OrganizationId, ProjectConfig, ProjectId, ProviderConnection, RoutingSettings, UserId,
};
use storage::InMemoryConfigStore;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

pub fn unique_org_id() -> OrganizationId {
    OrganizationId::new(unique_id("test-org")).unwrap_or_else(|| org_id("test-org"))
}

/// Panics on an invalid id; fixtures only pass literals.
pub fn org_id(id: &str) -> OrganizationId {
    OrganizationId::new(id).unwrap_or_else(|| panic!("invalid organization id {id:?}"))
}

pub fn project_id(id: &str) -> ProjectId {
    ProjectId::new(id).unwrap_or_else(|| panic!("invalid project id {id:?}"))
}

pub fn user_id(id: &str) -> UserId {
    UserId::new(id).unwrap_or_else(|| panic!("invalid user id {id:?}"))
}

/// Settings with only a model router section.
pub fn router_settings(cost_bias: f64) -> RoutingSettings {
    RoutingSettings {
        model_router_config: Some(ModelRouterConfig {
            cost_bias,
            semantic_cache: Default::default(),
        }),
        fallback_config: None,
        enabled: true,
    }
}

/// Settings with only a fallback section.
pub fn fallback_settings(timeout_ms: u64, max_retries: u32) -> RoutingSettings {
    RoutingSettings {
        model_router_config: None,
        fallback_config: Some(FallbackConfig {
            mode: FallbackMode::Parallel,
            timeout_ms,
            max_retries,
        }),
        enabled: true,
    }
}

pub fn organization_config(organization_id: &OrganizationId, cost_bias: f64) -> OrganizationConfig {
    OrganizationConfig {
        id: String::new(),
        organization_id: organization_id.clone(),
        settings: router_settings(cost_bias),
        created_by: UserId::default(),
        updated_by: UserId::default(),
        created_at: 0,
        updated_at: 0,
    }
}

pub fn project_config(
    organization_id: &OrganizationId,
    project: &ProjectId,
    settings: RoutingSettings,
) -> ProjectConfig {
    ProjectConfig {
        id: String::new(),
        organization_id: organization_id.clone(),
        project_id: project.clone(),
        settings,
        created_by: UserId::default(),
        updated_by: UserId::default(),
        created_at: 0,
        updated_at: 0,
    }
}

pub fn provider(organization_id: &OrganizationId, name: &str, priority: u32) -> ProviderConnection {
    ProviderConnection {
        id: String::new(),
        organization_id: organization_id.clone(),
        provider: name.to_string(),
        display_name: name.to_uppercase(),
        base_url: None,
        priority,
        enabled: true,
        created_by: UserId::default(),
        updated_by: UserId::default(),
        created_at: 0,
        updated_at: 0,
    }
}

/// A store holding one organization config with `cost_bias`.
pub fn seeded_store(organization_id: &OrganizationId, cost_bias: f64) -> Arc<InMemoryConfigStore> {
    let store = InMemoryConfigStore::new();
    if let Err(e) = store.create_organization(organization_config(organization_id, cost_bias)) {
        panic!("seeding {organization_id} failed: {e}");
    }
    Arc::new(store)
}

/// Identity collaborator with a fixed user and organization.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    pub user: UserId,
    pub organization: OrganizationId,
}

impl StaticIdentity {
    pub fn new(user: &str, organization: &OrganizationId) -> Self {
        Self {
            user: user_id(user),
            organization: organization.clone(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> UserId {
        self.user.clone()
    }

    fn organization_id(&self) -> OrganizationId {
        self.organization.clone()
    }
}
