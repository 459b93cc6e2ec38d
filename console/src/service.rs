use std::sync::Arc;

use cache::{CacheTelemetry, Mutation, MutationCoordinator, QueryCache};
use config::ClientConfig;
use errors::MutationError;
use forms::DirtyFormRegistry;
use rc_core::{
    AuditEntry, CacheKey, ConfigEvent, ConfigRpc, EffectiveConfig, HistorySource,
    IdentityProvider, MutationKind, OrganizationConfig, OrganizationId, ProjectConfig, ProjectId,
    ProviderConnection, RoutingSettings, UserId,
};
use resolver::SaveIntent;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::events::ConfigEventBroadcaster;
use crate::fetcher::ConfigQueryFetcher;
use crate::mutations::{
    DeleteOrganizationConfig, DeleteProjectConfig, DeleteProvider, WriteOrganizationConfig,
    WriteProjectConfig, WriteProvider,
};

/// Input for a new provider connection. Ownership and bookkeeping fields are
/// filled in by [`ConfigService::create_provider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    pub provider: String,
    pub display_name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Facade the admin console talks to.
///
/// Reads go through the shared [`QueryCache`]; every write goes through the
/// [`MutationCoordinator`] and, once committed, is announced on the event
/// channel for organization and project configs.
pub struct ConfigService {
    coordinator: MutationCoordinator,
    identity: Arc<dyn IdentityProvider>,
    events: ConfigEventBroadcaster,
    registry: DirtyFormRegistry,
}

impl ConfigService {
    pub fn new(
        rpc: Arc<dyn ConfigRpc>,
        identity: Arc<dyn IdentityProvider>,
        config: &ClientConfig,
    ) -> Self {
        let fetcher = Arc::new(ConfigQueryFetcher::new(rpc.clone()));
        let telemetry = CacheTelemetry::new(config.observability.metrics_enabled);
        let cache = Arc::new(QueryCache::with_telemetry(
            fetcher,
            config.cache.clone(),
            telemetry,
        ));

        Self {
            coordinator: MutationCoordinator::new(cache, rpc),
            identity,
            events: ConfigEventBroadcaster::new(&config.events),
            registry: DirtyFormRegistry::new(),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        self.coordinator.cache()
    }

    pub fn registry(&self) -> &DirtyFormRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    /// Organization of the signed-in user.
    pub fn current_organization(&self) -> OrganizationId {
        self.identity.organization_id()
    }

    fn actor(&self) -> UserId {
        self.identity.current_user()
    }

    async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<T, MutationError> {
        Ok(self.cache().fetch_as::<T>(key).await?)
    }

    async fn run<M: Mutation>(&self, mutation: &M) -> Result<serde_json::Value, MutationError> {
        self.coordinator.execute(mutation).await
    }

    // Reads

    pub async fn get_effective_config(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
    ) -> Result<EffectiveConfig, MutationError> {
        self.read(&CacheKey::effective_config(organization_id, project_id))
            .await
    }

    pub async fn organization_config(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationConfig>, MutationError> {
        self.read(&CacheKey::organization_config(organization_id))
            .await
    }

    pub async fn project_config(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
    ) -> Result<Option<ProjectConfig>, MutationError> {
        self.read(&CacheKey::project_config(organization_id, project_id))
            .await
    }

    pub async fn project_configs(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<ProjectConfig>, MutationError> {
        self.read(&CacheKey::project_configs(organization_id)).await
    }

    pub async fn providers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<ProviderConnection>, MutationError> {
        self.read(&CacheKey::providers(organization_id)).await
    }

    /// Config and provider history of an organization as one audit trail,
    /// newest first.
    pub async fn history(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<AuditEntry>, MutationError> {
        let config_key = CacheKey::config_history(organization_id);
        let provider_key = CacheKey::provider_history(organization_id);
        let (config_rows, provider_rows) = tokio::try_join!(
            self.read::<Vec<serde_json::Value>>(&config_key),
            self.read::<Vec<serde_json::Value>>(&provider_key),
        )?;

        Ok(audit::merge_projected(&[
            audit::HistoryPage::new(HistorySource::Config, config_rows),
            audit::HistoryPage::new(HistorySource::Provider, provider_rows),
        ]))
    }

    // Organization configs

    /// Create or update the organization's config, whichever the cached
    /// row calls for.
    pub async fn save_organization_config(
        &self,
        organization_id: &OrganizationId,
        settings: RoutingSettings,
    ) -> Result<OrganizationConfig, MutationError> {
        let current = self.organization_config(organization_id).await?;
        self.save_organization_config_from(current.as_ref(), organization_id, settings)
            .await
    }

    /// Save against the row the edit started from.
    #[instrument(skip(self, current, settings), fields(organization = %organization_id))]
    pub async fn save_organization_config_from(
        &self,
        current: Option<&OrganizationConfig>,
        organization_id: &OrganizationId,
        settings: RoutingSettings,
    ) -> Result<OrganizationConfig, MutationError> {
        let actor = self.actor();
        let mut row = OrganizationConfig {
            id: String::new(),
            organization_id: organization_id.clone(),
            settings,
            created_by: actor.clone(),
            updated_by: actor,
            created_at: 0,
            updated_at: 0,
        };

        let mutation = match resolver::organization_save_intent(current) {
            SaveIntent::Create => WriteOrganizationConfig::create(row),
            SaveIntent::Update {
                config_id,
                expected_updated_at,
            } => {
                row.id = config_id;
                row.updated_at = expected_updated_at;
                WriteOrganizationConfig::update(row)
            }
        };

        let response = self.run(&mutation).await?;
        self.events
            .organization_changed(organization_id, mutation.kind());
        decode(response)
    }

    pub async fn toggle_organization_config(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<OrganizationConfig, MutationError> {
        let mut row = self
            .organization_config(organization_id)
            .await?
            .ok_or_else(|| {
                MutationError::not_found("organization_config", organization_id.as_str())
            })?;
        row.updated_by = self.actor();

        let response = self.run(&WriteOrganizationConfig::toggle(row)).await?;
        self.events
            .organization_changed(organization_id, MutationKind::Toggle);
        decode(response)
    }

    pub async fn delete_organization_config(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<OrganizationConfig, MutationError> {
        let mutation = DeleteOrganizationConfig {
            organization_id: organization_id.clone(),
            actor: self.actor(),
        };

        let response = self.run(&mutation).await?;
        info!("Deleted organization config of {}", organization_id);
        self.events
            .organization_changed(organization_id, MutationKind::Delete);
        decode(response)
    }

    // Project configs

    /// Save project settings. Whether this creates the override or updates
    /// it follows the effective config currently cached for the project.
    pub async fn save_project_config(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
        settings: RoutingSettings,
    ) -> Result<ProjectConfig, MutationError> {
        let displayed = self
            .get_effective_config(organization_id, project_id)
            .await?;
        self.save_project_config_from(&displayed, organization_id, project_id, settings)
            .await
    }

    /// Save against the effective config the user was shown. An inherited
    /// view always produces a create; a project view an update guarded by
    /// its `updatedAt`.
    #[instrument(skip(self, displayed, settings), fields(organization = %organization_id, project = %project_id))]
    pub async fn save_project_config_from(
        &self,
        displayed: &EffectiveConfig,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
        settings: RoutingSettings,
    ) -> Result<ProjectConfig, MutationError> {
        let actor = self.actor();
        let mut row = ProjectConfig {
            id: String::new(),
            organization_id: organization_id.clone(),
            project_id: project_id.clone(),
            settings,
            created_by: actor.clone(),
            updated_by: actor,
            created_at: 0,
            updated_at: 0,
        };

        let mutation = match resolver::project_save_intent(displayed) {
            SaveIntent::Create => WriteProjectConfig::create(row),
            SaveIntent::Update {
                config_id,
                expected_updated_at,
            } => {
                row.id = config_id;
                row.updated_at = expected_updated_at;
                WriteProjectConfig::update(row)
            }
        };

        let response = self.run(&mutation).await?;
        self.events
            .project_changed(organization_id, project_id, mutation.kind());
        decode(response)
    }

    pub async fn toggle_project_config(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
    ) -> Result<ProjectConfig, MutationError> {
        let mut row = self
            .project_config(organization_id, project_id)
            .await?
            .ok_or_else(|| MutationError::not_found("project_config", project_id.as_str()))?;
        row.updated_by = self.actor();

        let response = self.run(&WriteProjectConfig::toggle(row)).await?;
        self.events
            .project_changed(organization_id, project_id, MutationKind::Toggle);
        decode(response)
    }

    /// Drop the project override; the project inherits again.
    pub async fn delete_project_config(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
    ) -> Result<ProjectConfig, MutationError> {
        let mutation = DeleteProjectConfig {
            organization_id: organization_id.clone(),
            project_id: project_id.clone(),
            actor: self.actor(),
        };

        let response = self.run(&mutation).await?;
        self.events
            .project_changed(organization_id, project_id, MutationKind::Delete);
        decode(response)
    }

    // Providers

    pub async fn create_provider(
        &self,
        organization_id: &OrganizationId,
        draft: NewProvider,
    ) -> Result<ProviderConnection, MutationError> {
        let actor = self.actor();
        let row = ProviderConnection {
            id: String::new(),
            organization_id: organization_id.clone(),
            provider: draft.provider,
            display_name: draft.display_name,
            base_url: draft.base_url,
            priority: draft.priority,
            enabled: draft.enabled,
            created_by: actor.clone(),
            updated_by: actor,
            created_at: 0,
            updated_at: 0,
        };

        decode(self.run(&WriteProvider::create(row)).await?)
    }

    /// `provider.updated_at` must be the timestamp the edit started from.
    pub async fn update_provider(
        &self,
        mut provider: ProviderConnection,
    ) -> Result<ProviderConnection, MutationError> {
        provider.updated_by = self.actor();
        decode(self.run(&WriteProvider::update(provider)).await?)
    }

    pub async fn toggle_provider(
        &self,
        organization_id: &OrganizationId,
        provider_id: &str,
    ) -> Result<ProviderConnection, MutationError> {
        let mut provider = self
            .read::<Option<ProviderConnection>>(&CacheKey::provider(organization_id, provider_id))
            .await?
            .ok_or_else(|| MutationError::not_found("provider_connection", provider_id))?;
        provider.updated_by = self.actor();

        decode(self.run(&WriteProvider::toggle(provider)).await?)
    }

    pub async fn delete_provider(
        &self,
        organization_id: &OrganizationId,
        provider_id: &str,
    ) -> Result<ProviderConnection, MutationError> {
        let mutation = DeleteProvider {
            organization_id: organization_id.clone(),
            provider_id: provider_id.to_string(),
            actor: self.actor(),
        };

        decode(self.run(&mutation).await?)
    }
}

fn decode<T: DeserializeOwned>(response: serde_json::Value) -> Result<T, MutationError> {
    serde_json::from_value(response)
        .map_err(|e| MutationError::transport(format!("malformed response: {e}")))
}
