//! Concrete writes run through the [`MutationCoordinator`].
//!
//! Each type decides which entries it touches and what they look like
//! before the server answers. Lists are only patched when already loaded;
//! everything derived from the written row (effective configs, history) is
//! listed as a dependent and refetched after commit.
//!
//! [`MutationCoordinator`]: cache::MutationCoordinator

use async_trait::async_trait;
use cache::{Mutation, Speculation};
use errors::MutationError;
use rc_core::{
    CacheKey, ConfigRpc, KeyPattern, MutationKind, ORGANIZATION_PARAM, OrganizationConfig,
    OrganizationId, PROJECT_PARAM, PROVIDER_PARAM, ProjectConfig, ProjectId, ProviderConnection,
    ResourceKind, RoutingSettings, UserId,
};
use serde::Serialize;
use serde_json::{Value, json};
use validator::{Validate, ValidationErrors};

pub struct WriteOrganizationConfig {
    kind: MutationKind,
    row: OrganizationConfig,
}

impl WriteOrganizationConfig {
    pub fn create(mut row: OrganizationConfig) -> Self {
        row.id = utils::generate_temp_id();
        Self {
            kind: MutationKind::Create,
            row,
        }
    }

    /// `row.updated_at` must be the timestamp the edit started from.
    pub fn update(row: OrganizationConfig) -> Self {
        Self {
            kind: MutationKind::Update,
            row,
        }
    }

    pub fn toggle(mut row: OrganizationConfig) -> Self {
        row.settings.enabled = !row.settings.enabled;
        Self {
            kind: MutationKind::Toggle,
            row,
        }
    }
}

#[async_trait]
impl Mutation for WriteOrganizationConfig {
    fn kind(&self) -> MutationKind {
        self.kind
    }

    fn resource(&self) -> ResourceKind {
        ResourceKind::OrganizationConfig
    }

    fn validate(&self) -> Result<(), MutationError> {
        validate_settings(&self.row.settings)
    }

    fn primary_key(&self) -> CacheKey {
        CacheKey::organization_config(&self.row.organization_id)
    }

    fn speculate(&self, key: &CacheKey, _current: Option<&Value>) -> Speculation {
        if *key == self.primary_key() {
            return speculate_row(&self.row);
        }
        Speculation::Keep
    }

    async fn dispatch(&self, rpc: &dyn ConfigRpc) -> Result<Value, MutationError> {
        let payload = to_payload(&self.row)?;
        match self.kind {
            MutationKind::Create => rpc.create(ResourceKind::OrganizationConfig, payload).await,
            _ => rpc.update(ResourceKind::OrganizationConfig, payload).await,
        }
    }

    fn dependents(&self) -> Vec<KeyPattern> {
        let organization_id = &self.row.organization_id;
        vec![
            KeyPattern::effective_configs_of(organization_id),
            KeyPattern::exact(&CacheKey::config_history(organization_id)),
        ]
    }
}

/// Removes the organization's config row; its projects fall back to their
/// own overrides or the system default.
pub struct DeleteOrganizationConfig {
    pub organization_id: OrganizationId,
    pub actor: UserId,
}

#[async_trait]
impl Mutation for DeleteOrganizationConfig {
    fn kind(&self) -> MutationKind {
        MutationKind::Delete
    }

    fn resource(&self) -> ResourceKind {
        ResourceKind::OrganizationConfig
    }

    fn primary_key(&self) -> CacheKey {
        CacheKey::organization_config(&self.organization_id)
    }

    fn speculate(&self, _key: &CacheKey, _current: Option<&Value>) -> Speculation {
        Speculation::Set(Value::Null)
    }

    async fn dispatch(&self, rpc: &dyn ConfigRpc) -> Result<Value, MutationError> {
        let payload = json!({
            ORGANIZATION_PARAM: self.organization_id,
            "updatedBy": self.actor,
        });
        rpc.delete(ResourceKind::OrganizationConfig, payload).await
    }

    fn commit(&self, _response: &Value) -> Speculation {
        Speculation::Set(Value::Null)
    }

    fn dependents(&self) -> Vec<KeyPattern> {
        vec![
            KeyPattern::effective_configs_of(&self.organization_id),
            KeyPattern::exact(&CacheKey::config_history(&self.organization_id)),
        ]
    }
}

pub struct WriteProjectConfig {
    kind: MutationKind,
    row: ProjectConfig,
}

impl WriteProjectConfig {
    pub fn create(mut row: ProjectConfig) -> Self {
        row.id = utils::generate_temp_id();
        Self {
            kind: MutationKind::Create,
            row,
        }
    }

    /// `row.updated_at` must be the timestamp the edit started from.
    pub fn update(row: ProjectConfig) -> Self {
        Self {
            kind: MutationKind::Update,
            row,
        }
    }

    pub fn toggle(mut row: ProjectConfig) -> Self {
        row.settings.enabled = !row.settings.enabled;
        Self {
            kind: MutationKind::Toggle,
            row,
        }
    }

    fn list_key(&self) -> CacheKey {
        CacheKey::project_configs(&self.row.organization_id)
    }

    fn effective_key(&self) -> CacheKey {
        CacheKey::effective_config(&self.row.organization_id, &self.row.project_id)
    }
}

#[async_trait]
impl Mutation for WriteProjectConfig {
    fn kind(&self) -> MutationKind {
        self.kind
    }

    fn resource(&self) -> ResourceKind {
        ResourceKind::ProjectConfig
    }

    fn validate(&self) -> Result<(), MutationError> {
        validate_settings(&self.row.settings)
    }

    fn primary_key(&self) -> CacheKey {
        CacheKey::project_config(&self.row.organization_id, &self.row.project_id)
    }

    fn touched_keys(&self) -> Vec<CacheKey> {
        vec![self.primary_key(), self.list_key(), self.effective_key()]
    }

    fn speculate(&self, key: &CacheKey, current: Option<&Value>) -> Speculation {
        if *key == self.primary_key() {
            return speculate_row(&self.row);
        }
        if current.is_none() {
            return Speculation::Keep;
        }
        if *key == self.list_key() {
            return match serde_json::to_value(&self.row) {
                Ok(row) => upsert(current, row, PROJECT_PARAM),
                Err(_) => Speculation::Keep,
            };
        }
        if *key == self.effective_key() {
            // A project row always wins, so the resolved view is known locally.
            return speculate_row(&resolver::resolve(None, Some(&self.row)));
        }
        Speculation::Keep
    }

    async fn dispatch(&self, rpc: &dyn ConfigRpc) -> Result<Value, MutationError> {
        let payload = to_payload(&self.row)?;
        match self.kind {
            MutationKind::Create => rpc.create(ResourceKind::ProjectConfig, payload).await,
            _ => rpc.update(ResourceKind::ProjectConfig, payload).await,
        }
    }

    fn dependents(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::exact(&CacheKey::config_history(
            &self.row.organization_id,
        ))]
    }
}

/// Removes a project override; the project inherits again.
pub struct DeleteProjectConfig {
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub actor: UserId,
}

#[async_trait]
impl Mutation for DeleteProjectConfig {
    fn kind(&self) -> MutationKind {
        MutationKind::Delete
    }

    fn resource(&self) -> ResourceKind {
        ResourceKind::ProjectConfig
    }

    fn primary_key(&self) -> CacheKey {
        CacheKey::project_config(&self.organization_id, &self.project_id)
    }

    fn touched_keys(&self) -> Vec<CacheKey> {
        vec![
            self.primary_key(),
            CacheKey::project_configs(&self.organization_id),
        ]
    }

    fn speculate(&self, key: &CacheKey, current: Option<&Value>) -> Speculation {
        if *key == self.primary_key() {
            return Speculation::Set(Value::Null);
        }
        remove(current, PROJECT_PARAM, self.project_id.as_str())
    }

    async fn dispatch(&self, rpc: &dyn ConfigRpc) -> Result<Value, MutationError> {
        let payload = json!({
            ORGANIZATION_PARAM: self.organization_id,
            PROJECT_PARAM: self.project_id,
            "updatedBy": self.actor,
        });
        rpc.delete(ResourceKind::ProjectConfig, payload).await
    }

    fn commit(&self, _response: &Value) -> Speculation {
        Speculation::Set(Value::Null)
    }

    fn dependents(&self) -> Vec<KeyPattern> {
        vec![
            KeyPattern::exact(&CacheKey::effective_config(
                &self.organization_id,
                &self.project_id,
            )),
            KeyPattern::exact(&CacheKey::config_history(&self.organization_id)),
        ]
    }
}

/// Create, update or toggle of a provider connection.
///
/// A created row has no server id yet, so its primary entry is the
/// organization's provider list, which is refetched instead of committed.
pub struct WriteProvider {
    kind: MutationKind,
    row: ProviderConnection,
}

impl WriteProvider {
    pub fn create(mut row: ProviderConnection) -> Self {
        row.id = utils::generate_temp_id();
        Self {
            kind: MutationKind::Create,
            row,
        }
    }

    pub fn update(row: ProviderConnection) -> Self {
        Self {
            kind: MutationKind::Update,
            row,
        }
    }

    pub fn toggle(mut row: ProviderConnection) -> Self {
        row.enabled = !row.enabled;
        Self {
            kind: MutationKind::Toggle,
            row,
        }
    }

    fn list_key(&self) -> CacheKey {
        CacheKey::providers(&self.row.organization_id)
    }
}

#[async_trait]
impl Mutation for WriteProvider {
    fn kind(&self) -> MutationKind {
        self.kind
    }

    fn resource(&self) -> ResourceKind {
        ResourceKind::ProviderConnection
    }

    fn validate(&self) -> Result<(), MutationError> {
        self.row.validate().map_err(validation_error)
    }

    fn primary_key(&self) -> CacheKey {
        match self.kind {
            MutationKind::Create => self.list_key(),
            _ => CacheKey::provider(&self.row.organization_id, &self.row.id),
        }
    }

    fn touched_keys(&self) -> Vec<CacheKey> {
        vec![self.primary_key(), self.list_key()]
    }

    fn speculate(&self, key: &CacheKey, current: Option<&Value>) -> Speculation {
        if *key == self.list_key() {
            if current.is_none() {
                return Speculation::Keep;
            }
            return match serde_json::to_value(&self.row) {
                Ok(row) => upsert(current, row, "id"),
                Err(_) => Speculation::Keep,
            };
        }
        speculate_row(&self.row)
    }

    async fn dispatch(&self, rpc: &dyn ConfigRpc) -> Result<Value, MutationError> {
        let payload = to_payload(&self.row)?;
        match self.kind {
            MutationKind::Create => rpc.create(ResourceKind::ProviderConnection, payload).await,
            _ => rpc.update(ResourceKind::ProviderConnection, payload).await,
        }
    }

    fn commit(&self, response: &Value) -> Speculation {
        match self.kind {
            MutationKind::Create => Speculation::Keep,
            _ => Speculation::Set(response.clone()),
        }
    }

    fn dependents(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::exact(&CacheKey::provider_history(
            &self.row.organization_id,
        ))]
    }
}

pub struct DeleteProvider {
    pub organization_id: OrganizationId,
    pub provider_id: String,
    pub actor: UserId,
}

#[async_trait]
impl Mutation for DeleteProvider {
    fn kind(&self) -> MutationKind {
        MutationKind::Delete
    }

    fn resource(&self) -> ResourceKind {
        ResourceKind::ProviderConnection
    }

    fn primary_key(&self) -> CacheKey {
        CacheKey::provider(&self.organization_id, &self.provider_id)
    }

    fn touched_keys(&self) -> Vec<CacheKey> {
        vec![self.primary_key(), CacheKey::providers(&self.organization_id)]
    }

    fn speculate(&self, key: &CacheKey, current: Option<&Value>) -> Speculation {
        if *key == self.primary_key() {
            return Speculation::Set(Value::Null);
        }
        remove(current, "id", &self.provider_id)
    }

    async fn dispatch(&self, rpc: &dyn ConfigRpc) -> Result<Value, MutationError> {
        let payload = json!({
            ORGANIZATION_PARAM: self.organization_id,
            PROVIDER_PARAM: self.provider_id,
            "updatedBy": self.actor,
        });
        rpc.delete(ResourceKind::ProviderConnection, payload).await
    }

    fn commit(&self, _response: &Value) -> Speculation {
        Speculation::Set(Value::Null)
    }

    fn dependents(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::exact(&CacheKey::provider_history(
            &self.organization_id,
        ))]
    }
}

/// Client-side checks on a settings payload.
pub fn validate_settings(settings: &RoutingSettings) -> Result<(), MutationError> {
    settings.validate().map_err(validation_error)
}

fn validation_error(errors: ValidationErrors) -> MutationError {
    let field = errors
        .errors()
        .keys()
        .min()
        .map_or_else(|| "settings".to_string(), |field| field.to_string());
    MutationError::validation(field, errors.to_string())
}

fn to_payload<T: Serialize>(row: &T) -> Result<Value, MutationError> {
    serde_json::to_value(row).map_err(|e| MutationError::transport(e.to_string()))
}

fn speculate_row<T: Serialize>(row: &T) -> Speculation {
    serde_json::to_value(row).map_or(Speculation::Keep, Speculation::Set)
}

/// Replace the item whose `id_field` matches `item`'s, or append it.
fn upsert(current: Option<&Value>, item: Value, id_field: &str) -> Speculation {
    let Some(items) = current.and_then(Value::as_array) else {
        return Speculation::Keep;
    };
    let id = item.get(id_field).cloned();
    let mut items = items.clone();
    match items.iter_mut().find(|existing| existing.get(id_field).cloned() == id) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
    Speculation::Set(Value::Array(items))
}

fn remove(current: Option<&Value>, id_field: &str, id: &str) -> Speculation {
    let Some(items) = current.and_then(Value::as_array) else {
        return Speculation::Keep;
    };
    let kept = items
        .iter()
        .filter(|item| item.get(id_field).and_then(Value::as_str) != Some(id))
        .cloned()
        .collect();
    Speculation::Set(Value::Array(kept))
}
