//! # Routing Configuration Core
//!
//! Shared types and collaborator traits for the layered routing
//! configuration system.
//!
//! This crate provides:
//! - Identifier newtypes for organizations, projects and users
//! - Organization and project configuration records plus the derived
//!   effective configuration
//! - Provider connections and the uniform audit entry shape
//! - Cache addressing (`CacheKey`, `KeyPattern`)
//! - The RPC and identity collaborator traits
//!
//! # Best Practices
//!
//! - Uses Rust Edition 2024
//! - Validation with the `validator` crate
//! - Enum string forms via `strum`

pub mod traits;
pub mod types;

pub use traits::{ConfigRpc, IdentityProvider};
pub use types::{
    AuditEntry, CacheKey, ConfigEvent, ConfigSource, EffectiveConfig, FallbackConfig,
    FallbackMode, HistorySource, KeyPattern, ModelRouterConfig, MutationKind, OrganizationConfig,
    OrganizationId, ProjectConfig, ProjectId, ProviderConnection, QueryShape, ResourceKind,
    ResourceParams, RoutingSettings, SemanticCacheSettings, UserId, ORGANIZATION_PARAM,
    PROJECT_PARAM, PROVIDER_PARAM,
};
