//! # Query Cache
//!
//! Client-side store of query results keyed by `(resourceKind,
//! resourceParams)`, plus the optimistic mutation protocol that is the only
//! way to write into it.
//!
//! Every mutating operation runs the same sequence through
//! [`MutationCoordinator::execute`]:
//! 1. cancel in-flight refetches of the touched entries
//! 2. snapshot the touched entries
//! 3. write speculative results into them
//! 4. dispatch the RPC
//! 5. on success, commit the server response to the primary entry and
//!    invalidate-and-refetch every dependent entry
//! 6. on failure, restore every snapshot and return the error
//! 7. in both cases, re-invalidate the primary entry (settle)

pub mod entry;
pub mod mutation;
pub mod query_cache;
pub mod telemetry;

pub use entry::{CacheEntry, EntryStatus};
pub use mutation::{Mutation, MutationCoordinator, Speculation};
pub use query_cache::{QueryCache, QueryFetcher};
pub use telemetry::CacheTelemetry;
