use rc_core::{OrganizationConfig, ProjectConfig, ProviderConnection};
use serde::{Deserialize, Serialize};

/// Snapshot of store rows, as loaded from a YAML or TOML seed file.
///
/// Bookkeeping fields (`id`, `createdBy`, timestamps) may be omitted; the
/// store fills them in on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSeed {
    pub organizations: Vec<OrganizationConfig>,
    pub projects: Vec<ProjectConfig>,
    pub providers: Vec<ProviderConnection>,
}
