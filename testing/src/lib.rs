//! Shared test fixtures for the routing configuration workspace.
//!
//! Provides:
//! - sample organization/project/provider records and a seeded store
//! - `FlakyRpc`: fails chosen RPC verbs a set number of times
//! - `GatedRpc`: holds reads until released, for cancellation races
//! - `StaticIdentity`: a fixed acting user and organization

mod fixtures;
mod rpc;

pub use fixtures::*;
pub use rpc::*;
