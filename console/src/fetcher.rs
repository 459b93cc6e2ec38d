use std::sync::Arc;

use async_trait::async_trait;
use cache::QueryFetcher;
use errors::MutationError;
use rc_core::{
    CacheKey, ConfigRpc, OrganizationConfig, ProjectConfig, QueryShape, ResourceKind,
    ResourceParams,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Loads cache entries through the RPC boundary.
///
/// Single entries map to `get` (an absent row becomes `null`), lists to
/// `list`. Effective configs are never stored; they are resolved here from
/// the organization and project rows.
pub struct ConfigQueryFetcher {
    rpc: Arc<dyn ConfigRpc>,
}

impl ConfigQueryFetcher {
    pub fn new(rpc: Arc<dyn ConfigRpc>) -> Self {
        Self { rpc }
    }

    async fn resolve_effective(&self, params: &ResourceParams) -> Result<Value, MutationError> {
        let organization_id = params
            .organization_id()
            .ok_or_else(|| MutationError::validation(rc_core::ORGANIZATION_PARAM, "missing"))?;
        let org_params = ResourceParams::new().with(rc_core::ORGANIZATION_PARAM, organization_id.as_str());

        let (organization, project) = tokio::try_join!(
            self.rpc.get(ResourceKind::OrganizationConfig, &org_params),
            self.rpc.get(ResourceKind::ProjectConfig, params),
        )?;

        let organization: Option<OrganizationConfig> = decode_row(organization)?;
        let project: Option<ProjectConfig> = decode_row(project)?;
        let effective = resolver::resolve(organization.as_ref(), project.as_ref());

        serde_json::to_value(effective).map_err(|e| MutationError::transport(e.to_string()))
    }
}

#[async_trait]
impl QueryFetcher for ConfigQueryFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<Value, MutationError> {
        match (key.kind, key.shape) {
            (ResourceKind::EffectiveConfig, _) => self.resolve_effective(&key.params).await,
            (kind, QueryShape::Single) => Ok(self
                .rpc
                .get(kind, &key.params)
                .await?
                .unwrap_or(Value::Null)),
            (kind, QueryShape::List) => Ok(Value::Array(self.rpc.list(kind, &key.params).await?)),
        }
    }
}

fn decode_row<T: DeserializeOwned>(row: Option<Value>) -> Result<Option<T>, MutationError> {
    row.map(serde_json::from_value::<T>)
        .transpose()
        .map_err(|e| MutationError::transport(format!("malformed row: {e}")))
}
