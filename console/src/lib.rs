//! # Routing Configuration Console
//!
//! Client-side facade over layered routing configuration: organization
//! defaults, per-project overrides and provider connections.
//!
//! - [`ConfigService`] reads through a shared query cache and writes through
//!   the optimistic mutation coordinator
//! - Committed organization and project writes are broadcast as
//!   [`rc_core::ConfigEvent`]s
//! - [`ProjectConfigForm`] and [`OrganizationConfigForm`] plug edits into
//!   the dirty-form registry so unsaved changes can be saved as a batch
//!
//! ## Usage
//! ```rust,ignore
//! let service = ConfigService::new(rpc, identity, &ClientConfig::default());
//! let effective = service.get_effective_config(&org, &project).await?;
//! service.save_project_config(&org, &project, settings).await?;
//! ```

pub mod config_forms;
pub mod events;
pub mod fetcher;
pub mod mutations;
pub mod service;

pub use config_forms::{OrganizationConfigForm, ProjectConfigForm};
pub use events::ConfigEventBroadcaster;
pub use fetcher::ConfigQueryFetcher;
pub use service::{ConfigService, NewProvider};
