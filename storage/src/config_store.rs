//! # In-Memory Configuration Store
//!
//! Source of truth for organization configs, project configs and provider
//! connections, reachable only through [`ConfigRpc`].
//!
//! ## Write rules
//! - `create` of a row that already exists is a `Conflict`
//! - `update`/`delete` of a missing row is `NotFound`
//! - `update` carries the `updatedAt` the caller edited from; any other value
//!   is a `Conflict`
//! - server timestamps are strictly increasing across the whole store
//!
//! Every committed write appends a history row.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use errors::MutationError;
use parking_lot::RwLock;
use rc_core::{
    ConfigRpc, MutationKind, ORGANIZATION_PARAM, OrganizationConfig, OrganizationId, PROJECT_PARAM,
    PROVIDER_PARAM, ProjectConfig, ProjectId, ProviderConnection, ResourceKind, ResourceParams,
    RoutingSettings, UserId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use validator::Validate;

use crate::history::{ConfigHistoryRow, ProviderHistoryRow, classify, diff};
use crate::seed::StoreSeed;

const ORGANIZATION_SCOPE: &str = "organization";
const PROJECT_SCOPE: &str = "project";

#[derive(Default)]
pub struct InMemoryConfigStore {
    organizations: DashMap<OrganizationId, OrganizationConfig>,
    projects: DashMap<(OrganizationId, ProjectId), ProjectConfig>,
    providers: DashMap<String, ProviderConnection>,
    config_history: RwLock<Vec<ConfigHistoryRow>>,
    provider_history: RwLock<Vec<ProviderHistoryRow>>,
    clock: AtomicI64,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot. Rows go through the regular create
    /// path, so they are validated and recorded in history.
    pub fn from_seed(seed: StoreSeed) -> Result<Self, MutationError> {
        let store = Self::new();
        for row in seed.organizations {
            store.create_organization(row)?;
        }
        for row in seed.projects {
            store.create_project(row)?;
        }
        for row in seed.providers {
            store.create_provider(row)?;
        }
        info!(
            "Seeded store with {} organizations, {} projects, {} providers",
            store.organizations.len(),
            store.projects.len(),
            store.providers.len()
        );
        Ok(store)
    }

    pub fn organization_config(&self, organization_id: &OrganizationId) -> Option<OrganizationConfig> {
        self.organizations
            .get(organization_id)
            .map(|row| row.clone())
    }

    pub fn project_config(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
    ) -> Option<ProjectConfig> {
        self.projects
            .get(&(organization_id.clone(), project_id.clone()))
            .map(|row| row.clone())
    }

    pub fn providers_of(&self, organization_id: &OrganizationId) -> Vec<ProviderConnection> {
        let mut rows: Vec<ProviderConnection> = self
            .providers
            .iter()
            .filter(|row| &row.organization_id == organization_id)
            .map(|row| row.clone())
            .collect();
        rows.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    pub fn config_history_of(&self, organization_id: &OrganizationId) -> Vec<ConfigHistoryRow> {
        let mut rows: Vec<ConfigHistoryRow> = self
            .config_history
            .read()
            .iter()
            .filter(|row| &row.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));
        rows
    }

    pub fn provider_history_of(&self, organization_id: &OrganizationId) -> Vec<ProviderHistoryRow> {
        let mut rows: Vec<ProviderHistoryRow> = self
            .provider_history
            .read()
            .iter()
            .filter(|row| &row.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    fn tick(&self) -> i64 {
        let now = utils::now_millis();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    fn record_config(
        &self,
        operation: MutationKind,
        organization_id: &OrganizationId,
        project_id: Option<&ProjectId>,
        config_id: &str,
        changes: Value,
        performed_by: &UserId,
        performed_at: i64,
    ) {
        let scope = if project_id.is_some() {
            PROJECT_SCOPE
        } else {
            ORGANIZATION_SCOPE
        };
        self.config_history.write().push(ConfigHistoryRow {
            history_id: utils::generate_uuid(),
            organization_id: organization_id.clone(),
            project_id: project_id.cloned(),
            operation: classify(operation, &changes),
            scope: scope.to_string(),
            config_id: config_id.to_string(),
            diff: changes,
            performed_by: performed_by.clone(),
            performed_at,
        });
    }

    fn record_provider(
        &self,
        operation: MutationKind,
        row: &ProviderConnection,
        changes: Value,
        actor: &UserId,
        at: i64,
    ) {
        self.provider_history.write().push(ProviderHistoryRow {
            id: utils::generate_uuid(),
            organization_id: row.organization_id.clone(),
            provider_id: row.id.clone(),
            event_type: classify(operation, &changes),
            changed_fields: changes,
            actor_id: actor.clone(),
            created_at: at,
        });
    }

    pub fn create_organization(
        &self,
        mut row: OrganizationConfig,
    ) -> Result<OrganizationConfig, MutationError> {
        validate_settings(&row.settings)?;
        let now = self.tick();
        row.id = server_id(&row.id);
        row.updated_by = row.created_by.clone();
        row.created_at = now;
        row.updated_at = now;

        match self.organizations.entry(row.organization_id.clone()) {
            Entry::Occupied(existing) => {
                return Err(MutationError::conflict(
                    ResourceKind::OrganizationConfig.to_string(),
                    existing.get().id.clone(),
                    "organization already has a configuration",
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
            }
        }

        let changes = diff(None, Some(&to_payload(&row)?));
        self.record_config(
            MutationKind::Create,
            &row.organization_id,
            None,
            &row.id,
            changes,
            &row.created_by,
            now,
        );
        info!("Created organization config {} for {}", row.id, row.organization_id);
        Ok(row)
    }

    pub fn update_organization(
        &self,
        row: OrganizationConfig,
    ) -> Result<OrganizationConfig, MutationError> {
        validate_settings(&row.settings)?;
        let resource = ResourceKind::OrganizationConfig.to_string();
        let (before, after) = {
            let mut existing = self
                .organizations
                .get_mut(&row.organization_id)
                .ok_or_else(|| MutationError::not_found(&resource, row.organization_id.as_str()))?;
            check_version(&resource, &existing.id, existing.updated_at, row.updated_at)?;

            let before = to_payload(&*existing)?;
            existing.settings = row.settings;
            existing.updated_by = row.updated_by;
            existing.updated_at = self.tick();
            (before, existing.clone())
        };

        let changes = diff(Some(&before), Some(&to_payload(&after)?));
        self.record_config(
            MutationKind::Update,
            &after.organization_id,
            None,
            &after.id,
            changes,
            &after.updated_by,
            after.updated_at,
        );
        debug!("Updated organization config {}", after.id);
        Ok(after)
    }

    pub fn delete_organization(
        &self,
        organization_id: &OrganizationId,
        actor: &UserId,
    ) -> Result<OrganizationConfig, MutationError> {
        let (_, removed) = self.organizations.remove(organization_id).ok_or_else(|| {
            MutationError::not_found(
                ResourceKind::OrganizationConfig.to_string(),
                organization_id.as_str(),
            )
        })?;

        let changes = diff(Some(&to_payload(&removed)?), None);
        self.record_config(
            MutationKind::Delete,
            organization_id,
            None,
            &removed.id,
            changes,
            actor,
            self.tick(),
        );
        info!("Deleted organization config {}", removed.id);
        Ok(removed)
    }

    pub fn create_project(&self, mut row: ProjectConfig) -> Result<ProjectConfig, MutationError> {
        validate_settings(&row.settings)?;
        let now = self.tick();
        row.id = server_id(&row.id);
        row.updated_by = row.created_by.clone();
        row.created_at = now;
        row.updated_at = now;

        let key = (row.organization_id.clone(), row.project_id.clone());
        match self.projects.entry(key) {
            Entry::Occupied(existing) => {
                return Err(MutationError::conflict(
                    ResourceKind::ProjectConfig.to_string(),
                    existing.get().id.clone(),
                    "project already has an override",
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
            }
        }

        let changes = diff(None, Some(&to_payload(&row)?));
        self.record_config(
            MutationKind::Create,
            &row.organization_id,
            Some(&row.project_id),
            &row.id,
            changes,
            &row.created_by,
            now,
        );
        info!("Created project config {} for {}", row.id, row.project_id);
        Ok(row)
    }

    pub fn update_project(&self, row: ProjectConfig) -> Result<ProjectConfig, MutationError> {
        validate_settings(&row.settings)?;
        let resource = ResourceKind::ProjectConfig.to_string();
        let key = (row.organization_id.clone(), row.project_id.clone());
        let (before, after) = {
            let mut existing = self
                .projects
                .get_mut(&key)
                .ok_or_else(|| MutationError::not_found(&resource, row.project_id.as_str()))?;
            check_version(&resource, &existing.id, existing.updated_at, row.updated_at)?;

            let before = to_payload(&*existing)?;
            existing.settings = row.settings;
            existing.updated_by = row.updated_by;
            existing.updated_at = self.tick();
            (before, existing.clone())
        };

        let changes = diff(Some(&before), Some(&to_payload(&after)?));
        self.record_config(
            MutationKind::Update,
            &after.organization_id,
            Some(&after.project_id),
            &after.id,
            changes,
            &after.updated_by,
            after.updated_at,
        );
        debug!("Updated project config {}", after.id);
        Ok(after)
    }

    pub fn delete_project(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
        actor: &UserId,
    ) -> Result<ProjectConfig, MutationError> {
        let key = (organization_id.clone(), project_id.clone());
        let (_, removed) = self.projects.remove(&key).ok_or_else(|| {
            MutationError::not_found(ResourceKind::ProjectConfig.to_string(), project_id.as_str())
        })?;

        let changes = diff(Some(&to_payload(&removed)?), None);
        self.record_config(
            MutationKind::Delete,
            organization_id,
            Some(project_id),
            &removed.id,
            changes,
            actor,
            self.tick(),
        );
        info!("Deleted project config {}", removed.id);
        Ok(removed)
    }

    pub fn create_provider(
        &self,
        mut row: ProviderConnection,
    ) -> Result<ProviderConnection, MutationError> {
        validate_provider(&row)?;
        let now = self.tick();
        row.id = server_id(&row.id);
        row.updated_by = row.created_by.clone();
        row.created_at = now;
        row.updated_at = now;

        match self.providers.entry(row.id.clone()) {
            Entry::Occupied(_) => {
                return Err(MutationError::conflict(
                    ResourceKind::ProviderConnection.to_string(),
                    row.id.clone(),
                    "provider id already in use",
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
            }
        }

        let changes = diff(None, Some(&to_payload(&row)?));
        self.record_provider(MutationKind::Create, &row, changes, &row.created_by, now);
        info!("Created provider connection {} ({})", row.id, row.provider);
        Ok(row)
    }

    pub fn update_provider(
        &self,
        row: ProviderConnection,
    ) -> Result<ProviderConnection, MutationError> {
        validate_provider(&row)?;
        let resource = ResourceKind::ProviderConnection.to_string();
        let (before, after) = {
            let mut existing = self
                .providers
                .get_mut(&row.id)
                .filter(|existing| existing.organization_id == row.organization_id)
                .ok_or_else(|| MutationError::not_found(&resource, &row.id))?;
            check_version(&resource, &existing.id, existing.updated_at, row.updated_at)?;

            let before = to_payload(&*existing)?;
            existing.provider = row.provider;
            existing.display_name = row.display_name;
            existing.base_url = row.base_url;
            existing.priority = row.priority;
            existing.enabled = row.enabled;
            existing.updated_by = row.updated_by;
            existing.updated_at = self.tick();
            (before, existing.clone())
        };

        let changes = diff(Some(&before), Some(&to_payload(&after)?));
        self.record_provider(
            MutationKind::Update,
            &after,
            changes,
            &after.updated_by,
            after.updated_at,
        );
        debug!("Updated provider connection {}", after.id);
        Ok(after)
    }

    pub fn delete_provider(
        &self,
        organization_id: &OrganizationId,
        provider_id: &str,
        actor: &UserId,
    ) -> Result<ProviderConnection, MutationError> {
        let (_, removed) = self
            .providers
            .remove_if(provider_id, |_, row| &row.organization_id == organization_id)
            .ok_or_else(|| {
                MutationError::not_found(ResourceKind::ProviderConnection.to_string(), provider_id)
            })?;

        let changes = diff(Some(&to_payload(&removed)?), None);
        self.record_provider(MutationKind::Delete, &removed, changes, actor, self.tick());
        info!("Deleted provider connection {}", removed.id);
        Ok(removed)
    }
}

#[async_trait]
impl ConfigRpc for InMemoryConfigStore {
    async fn get(
        &self,
        kind: ResourceKind,
        key: &ResourceParams,
    ) -> Result<Option<Value>, MutationError> {
        let organization_id = required_org(key)?;
        match kind {
            ResourceKind::OrganizationConfig => self
                .organization_config(&organization_id)
                .map(|row| to_payload(&row))
                .transpose(),
            ResourceKind::ProjectConfig => {
                let project_id = required_project(key)?;
                self.project_config(&organization_id, &project_id)
                    .map(|row| to_payload(&row))
                    .transpose()
            }
            ResourceKind::ProviderConnection => {
                let provider_id = key
                    .get(PROVIDER_PARAM)
                    .ok_or_else(|| MutationError::validation(PROVIDER_PARAM, "missing"))?;
                self.providers
                    .get(provider_id)
                    .filter(|row| row.organization_id == organization_id)
                    .map(|row| to_payload(&*row))
                    .transpose()
            }
            other => Err(unsupported(other, "get")),
        }
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceParams,
    ) -> Result<Vec<Value>, MutationError> {
        let organization_id = required_org(filter)?;
        match kind {
            ResourceKind::OrganizationConfig => self
                .organization_config(&organization_id)
                .iter()
                .map(to_payload)
                .collect(),
            ResourceKind::ProjectConfig => {
                let mut rows: Vec<ProjectConfig> = self
                    .projects
                    .iter()
                    .filter(|row| row.organization_id == organization_id)
                    .map(|row| row.clone())
                    .collect();
                rows.sort_by(|a, b| a.project_id.cmp(&b.project_id));
                rows.iter().map(to_payload).collect()
            }
            ResourceKind::ProviderConnection => {
                self.providers_of(&organization_id).iter().map(to_payload).collect()
            }
            ResourceKind::ConfigHistory => self
                .config_history_of(&organization_id)
                .iter()
                .map(to_payload)
                .collect(),
            ResourceKind::ProviderHistory => self
                .provider_history_of(&organization_id)
                .iter()
                .map(to_payload)
                .collect(),
            other => Err(unsupported(other, "list")),
        }
    }

    async fn create(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        match kind {
            ResourceKind::OrganizationConfig => {
                to_payload(&self.create_organization(decode(payload)?)?)
            }
            ResourceKind::ProjectConfig => to_payload(&self.create_project(decode(payload)?)?),
            ResourceKind::ProviderConnection => {
                to_payload(&self.create_provider(decode(payload)?)?)
            }
            other => Err(unsupported(other, "create")),
        }
    }

    async fn update(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        match kind {
            ResourceKind::OrganizationConfig => {
                to_payload(&self.update_organization(decode(payload)?)?)
            }
            ResourceKind::ProjectConfig => to_payload(&self.update_project(decode(payload)?)?),
            ResourceKind::ProviderConnection => {
                to_payload(&self.update_provider(decode(payload)?)?)
            }
            other => Err(unsupported(other, "update")),
        }
    }

    async fn delete(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        let params = key_params(&payload);
        let organization_id = required_org(&params)?;
        let actor = payload
            .get("updatedBy")
            .and_then(Value::as_str)
            .and_then(|id| UserId::new(id))
            .unwrap_or_default();

        match kind {
            ResourceKind::OrganizationConfig => {
                to_payload(&self.delete_organization(&organization_id, &actor)?)
            }
            ResourceKind::ProjectConfig => {
                let project_id = required_project(&params)?;
                to_payload(&self.delete_project(&organization_id, &project_id, &actor)?)
            }
            ResourceKind::ProviderConnection => {
                let provider_id = params
                    .get(PROVIDER_PARAM)
                    .ok_or_else(|| MutationError::validation(PROVIDER_PARAM, "missing"))?;
                to_payload(&self.delete_provider(&organization_id, provider_id, &actor)?)
            }
            other => Err(unsupported(other, "delete")),
        }
    }
}

fn server_id(requested: &str) -> String {
    if requested.is_empty() || utils::is_temp_id(requested) {
        utils::generate_uuid()
    } else {
        requested.to_string()
    }
}

fn check_version(
    resource: &str,
    id: &str,
    stored: i64,
    expected: i64,
) -> Result<(), MutationError> {
    if stored == expected {
        return Ok(());
    }
    Err(MutationError::conflict(
        resource,
        id,
        format!("edited from updatedAt {expected}, current is {stored}"),
    ))
}

fn validate_settings(settings: &RoutingSettings) -> Result<(), MutationError> {
    settings
        .validate()
        .map_err(|e| MutationError::validation("settings", e.to_string()))
}

fn validate_provider(row: &ProviderConnection) -> Result<(), MutationError> {
    row.validate()
        .map_err(|e| MutationError::validation("provider", e.to_string()))
}

fn required_org(params: &ResourceParams) -> Result<OrganizationId, MutationError> {
    params
        .organization_id()
        .ok_or_else(|| MutationError::validation(ORGANIZATION_PARAM, "missing"))
}

fn required_project(params: &ResourceParams) -> Result<ProjectId, MutationError> {
    params
        .project_id()
        .ok_or_else(|| MutationError::validation(PROJECT_PARAM, "missing"))
}

/// The string-valued fields of a delete payload, used as row keys.
fn key_params(payload: &Value) -> ResourceParams {
    payload
        .as_object()
        .into_iter()
        .flatten()
        .filter_map(|(name, value)| value.as_str().map(|value| (name, value)))
        .fold(ResourceParams::new(), |params, (name, value)| {
            params.with(name, value)
        })
}

fn unsupported(kind: ResourceKind, verb: &str) -> MutationError {
    MutationError::transport(format!("{kind} does not support {verb}"))
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, MutationError> {
    serde_json::from_value(payload).map_err(|e| MutationError::validation("payload", e.to_string()))
}

fn to_payload<T: Serialize>(row: &T) -> Result<Value, MutationError> {
    serde_json::to_value(row).map_err(|e| MutationError::transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_core::ModelRouterConfig;
    use serde_json::json;

    fn org() -> OrganizationId {
        OrganizationId::new("org-x").unwrap()
    }

    fn settings(cost_bias: f64) -> RoutingSettings {
        RoutingSettings {
            model_router_config: Some(ModelRouterConfig {
                cost_bias,
                semantic_cache: Default::default(),
            }),
            ..Default::default()
        }
    }

    fn org_row(cost_bias: f64) -> OrganizationConfig {
        OrganizationConfig {
            id: String::new(),
            organization_id: org(),
            settings: settings(cost_bias),
            created_by: UserId::new("alice").unwrap(),
            updated_by: UserId::new("alice").unwrap(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_create_assigns_id_and_timestamps() {
        let store = InMemoryConfigStore::new();
        let created = store.create_organization(org_row(0.3)).unwrap();

        assert!(!created.id.is_empty());
        assert!(created.created_at > 0);
        assert_eq!(created.created_at, created.updated_at);
    }

    #[test]
    fn test_second_create_conflicts() {
        let store = InMemoryConfigStore::new();
        store.create_organization(org_row(0.3)).unwrap();

        let err = store.create_organization(org_row(0.4)).unwrap_err();
        assert!(matches!(err, MutationError::Conflict { .. }));
    }

    #[test]
    fn test_update_with_stale_timestamp_conflicts() {
        let store = InMemoryConfigStore::new();
        let created = store.create_organization(org_row(0.3)).unwrap();

        let mut edit = created.clone();
        edit.settings = settings(0.5);
        let updated = store.update_organization(edit.clone()).unwrap();
        assert!(updated.updated_at > created.updated_at);

        let err = store.update_organization(edit).unwrap_err();
        assert!(matches!(err, MutationError::Conflict { .. }));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = InMemoryConfigStore::new();
        let err = store.update_organization(org_row(0.3)).unwrap_err();
        assert!(matches!(err, MutationError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let store = InMemoryConfigStore::new();
        let err = store.create_organization(org_row(2.0)).unwrap_err();
        assert!(matches!(err, MutationError::Validation { .. }));
    }

    #[test]
    fn test_toggle_is_recorded_as_toggle() {
        let store = InMemoryConfigStore::new();
        let created = store.create_organization(org_row(0.3)).unwrap();
        let mut edit = created;
        edit.settings.enabled = false;
        store.update_organization(edit).unwrap();

        let history = store.config_history_of(&org());
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].operation, MutationKind::Toggle);
        assert_eq!(history[1].operation, MutationKind::Create);
    }

    #[tokio::test]
    async fn test_rpc_get_absent_row_is_none() {
        let store = InMemoryConfigStore::new();
        let params = ResourceParams::new().with(ORGANIZATION_PARAM, "org-x");
        let row = store.get(ResourceKind::OrganizationConfig, &params).await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_rpc_delete_by_keys() {
        let store = InMemoryConfigStore::new();
        store.create_organization(org_row(0.3)).unwrap();

        let removed = store
            .delete(
                ResourceKind::OrganizationConfig,
                json!({"organizationId": "org-x", "updatedBy": "bob"}),
            )
            .await
            .unwrap();

        assert_eq!(removed["organizationId"], "org-x");
        assert!(store.organization_config(&org()).is_none());
        let history = store.config_history_of(&org());
        assert_eq!(history[0].operation, MutationKind::Delete);
        assert_eq!(history[0].performed_by.as_str(), "bob");
    }

    #[tokio::test]
    async fn test_effective_config_is_not_stored() {
        let store = InMemoryConfigStore::new();
        let params = ResourceParams::new().with(ORGANIZATION_PARAM, "org-x");
        let err = store
            .get(ResourceKind::EffectiveConfig, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Transport { .. }));
    }
}
