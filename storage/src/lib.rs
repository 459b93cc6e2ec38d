//! # Storage Layer
//!
//! In-memory persistence collaborator behind the `ConfigRpc` boundary:
//! configuration rows, provider connections and their history.

pub mod config_store;
pub mod history;
pub mod seed;

pub use config_store::InMemoryConfigStore;
pub use history::{ConfigHistoryRow, ProviderHistoryRow};
pub use seed::StoreSeed;
