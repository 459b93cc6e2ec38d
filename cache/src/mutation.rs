use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use errors::MutationError;
use rc_core::{CacheKey, ConfigRpc, KeyPattern, MutationKind, ResourceKind};
use tracing::{debug, info, instrument, warn};

use crate::entry::{EntryStatus, Snapshot};
use crate::query_cache::QueryCache;

/// What a mutation wants written into one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Speculation {
    /// Replace the entry's data. `Value::Null` marks the entity as absent.
    Set(serde_json::Value),
    /// Leave the entry untouched.
    Keep,
}

/// One create/update/delete/toggle against a resource.
///
/// Implementors only describe *what* the write touches and how its result
/// looks locally; [`MutationCoordinator::execute`] owns the ordering.
#[async_trait]
pub trait Mutation: Send + Sync {
    fn kind(&self) -> MutationKind;

    fn resource(&self) -> ResourceKind;

    /// Client-side checks. A failure here never reaches the RPC layer.
    fn validate(&self) -> Result<(), MutationError> {
        Ok(())
    }

    /// The single-entity entry that receives the server response.
    fn primary_key(&self) -> CacheKey;

    /// Every entry the mutation writes speculatively. Always includes the
    /// primary key, whether or not it is listed here.
    fn touched_keys(&self) -> Vec<CacheKey> {
        vec![self.primary_key()]
    }

    /// Locally synthesized data for `key`, given what it currently holds.
    fn speculate(&self, key: &CacheKey, current: Option<&serde_json::Value>) -> Speculation;

    async fn dispatch(&self, rpc: &dyn ConfigRpc) -> Result<serde_json::Value, MutationError>;

    /// Data stored in the primary entry once the server accepted the write.
    fn commit(&self, response: &serde_json::Value) -> Speculation {
        Speculation::Set(response.clone())
    }

    /// Entry families derived from the written entity. They are refetched
    /// after a successful write, never patched.
    fn dependents(&self) -> Vec<KeyPattern> {
        Vec::new()
    }
}

pub struct MutationCoordinator {
    cache: Arc<QueryCache>,
    rpc: Arc<dyn ConfigRpc>,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<QueryCache>, rpc: Arc<dyn ConfigRpc>) -> Self {
        Self { cache, rpc }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn rpc(&self) -> &Arc<dyn ConfigRpc> {
        &self.rpc
    }

    /// Run `mutation` through the optimistic write protocol.
    ///
    /// Returns the server response on success. On failure every touched
    /// entry is back at its pre-mutation snapshot and the error is returned
    /// unchanged.
    #[instrument(skip(self, mutation), fields(resource = %mutation.resource(), kind = %mutation.kind()))]
    pub async fn execute<M>(&self, mutation: &M) -> Result<serde_json::Value, MutationError>
    where
        M: Mutation + ?Sized,
    {
        let started = Instant::now();
        let resource = mutation.resource();
        let kind = mutation.kind();
        let telemetry = self.cache.telemetry();

        if let Err(e) = mutation.validate() {
            debug!("Mutation rejected before dispatch: {}", e);
            telemetry.record_mutation(resource, kind, "rejected", elapsed_ms(started));
            return Err(e);
        }

        let primary = mutation.primary_key();
        let touched = touched_keys(mutation, &primary);

        for key in &touched {
            self.cache.cancel(key);
        }

        let snapshots: Vec<(CacheKey, Snapshot)> = touched
            .iter()
            .map(|key| (key.clone(), self.cache.snapshot(key)))
            .collect();

        for key in &touched {
            let current = self.cache.data(key);
            if let Speculation::Set(value) = mutation.speculate(key, current.as_ref()) {
                self.cache.write(key, Some(value), EntryStatus::Optimistic);
            }
        }

        let outcome = match mutation.dispatch(self.rpc.as_ref()).await {
            Ok(response) => {
                if let Speculation::Set(value) = mutation.commit(&response) {
                    self.cache.write(&primary, Some(value), EntryStatus::Fresh);
                }

                let mut refreshed = 0;
                for key in touched.iter().filter(|key| **key != primary) {
                    refreshed += self.cache.invalidate(&KeyPattern::exact(key)).await;
                }
                for pattern in mutation.dependents() {
                    refreshed += self.cache.invalidate(&pattern).await;
                }

                info!("Mutation committed, {} dependent entries refreshed", refreshed);
                telemetry.record_mutation(resource, kind, "committed", elapsed_ms(started));
                Ok(response)
            }
            Err(error) => {
                let restored = snapshots.len();
                for (key, snapshot) in snapshots {
                    self.cache.restore(&key, snapshot);
                }

                warn!("Mutation failed, restored {} entries: {}", restored, error);
                telemetry.record_rollback(resource, restored);
                telemetry.record_mutation(resource, kind, "rolled_back", elapsed_ms(started));
                Err(error)
            }
        };

        // Settle: reconcile with whatever a concurrent mutation left behind.
        self.cache.invalidate(&KeyPattern::exact(&primary)).await;

        outcome
    }
}

fn touched_keys<M: Mutation + ?Sized>(mutation: &M, primary: &CacheKey) -> Vec<CacheKey> {
    let mut seen = HashSet::new();
    std::iter::once(primary.clone())
        .chain(mutation.touched_keys())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
