use async_trait::async_trait;
use errors::MutationError;

use crate::types::{OrganizationId, ResourceKind, ResourceParams, UserId};

/// Request/response boundary to the persistence collaborator.
///
/// Payloads are the camelCase JSON form of the records in `crate::types`.
/// Every verb returns either the typed success payload or a
/// [`MutationError`] from the shared taxonomy; nothing else is assumed about
/// the transport.
#[async_trait]
pub trait ConfigRpc: Send + Sync {
    /// Fetches one entity. `Ok(None)` means the row does not exist, which
    /// for configuration records is a meaningful state (inheritance).
    async fn get(
        &self,
        kind: ResourceKind,
        key: &ResourceParams,
    ) -> Result<Option<serde_json::Value>, MutationError>;

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceParams,
    ) -> Result<Vec<serde_json::Value>, MutationError>;

    async fn create(
        &self,
        kind: ResourceKind,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, MutationError>;

    async fn update(
        &self,
        kind: ResourceKind,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, MutationError>;

    /// Deletes the row addressed by `payload` and returns it as it was.
    async fn delete(
        &self,
        kind: ResourceKind,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, MutationError>;
}

/// Supplies who is acting and in which organization.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> UserId;

    fn organization_id(&self) -> OrganizationId;
}
