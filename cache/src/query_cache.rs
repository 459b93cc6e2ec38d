use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use config::CacheSettings;
use dashmap::DashMap;
use errors::{CacheError, MutationError};
use futures_util::future::join_all;
use rc_core::{CacheKey, KeyPattern};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::entry::{CacheEntry, EntryStatus, Snapshot};
use crate::telemetry::CacheTelemetry;

/// Loads the authoritative value of one cache key.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<serde_json::Value, MutationError>;
}

/// Keyed store of query results.
///
/// Reads (`fetch`, `refetch`, `invalidate`) are public. Writes of data are
/// crate-private and only reachable through the mutation protocol in
/// [`crate::mutation`].
///
/// Entries live in a `DashMap`; no shard guard is ever held across an
/// `.await`, so every step of a mutation observes and writes the cache
/// atomically per entry.
pub struct QueryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    fetcher: Arc<dyn QueryFetcher>,
    settings: CacheSettings,
    clock: AtomicU64,
    telemetry: CacheTelemetry,
}

impl QueryCache {
    pub fn new(fetcher: Arc<dyn QueryFetcher>, settings: CacheSettings) -> Self {
        Self::with_telemetry(fetcher, settings, CacheTelemetry::default())
    }

    pub fn with_telemetry(
        fetcher: Arc<dyn QueryFetcher>,
        settings: CacheSettings,
        telemetry: CacheTelemetry,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            fetcher,
            settings,
            clock: AtomicU64::new(0),
            telemetry,
        }
    }

    pub fn telemetry(&self) -> &CacheTelemetry {
        &self.telemetry
    }

    fn next_version(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn data(&self, key: &CacheKey) -> Option<serde_json::Value> {
        self.entries.get(key).and_then(|entry| entry.data.clone())
    }

    /// Decode the cached data of `key`. `Ok(None)` when nothing is loaded.
    pub fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        self.data(key)
            .map(|value| decode(key, value))
            .transpose()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys_matching(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().matches(pattern))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Return the cached value when fresh, otherwise load it.
    pub async fn fetch(&self, key: &CacheKey) -> Result<serde_json::Value, CacheError> {
        let now = utils::now_millis();
        let cached = self.entries.get(key).and_then(|entry| {
            if entry.is_fresh(self.settings.stale_time_ms, now) {
                entry.data.clone()
            } else {
                None
            }
        });

        if let Some(value) = cached {
            self.telemetry.record_hit(key.kind);
            return Ok(value);
        }

        self.telemetry.record_miss(key.kind);
        self.refetch(key).await
    }

    pub async fn fetch_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<T, CacheError> {
        let value = self.fetch(key).await?;
        decode(key, value)
    }

    /// Load `key` from the fetcher and store the result, unless the request
    /// was cancelled while in flight.
    ///
    /// A cancelled (superseded) response is discarded and the caller gets
    /// whatever the cache holds at that point.
    pub async fn refetch(&self, key: &CacheKey) -> Result<serde_json::Value, CacheError> {
        let generation = self.begin_fetch(key);
        let result = self.fetcher.fetch(key).await;
        self.telemetry.record_refetch(key.kind, result.is_ok());

        match result {
            Ok(value) => {
                if self.finish_fetch(key, generation, value.clone()) {
                    Ok(value)
                } else {
                    debug!("Discarding superseded response for {}", key);
                    self.telemetry.record_discarded_response(key.kind);
                    Ok(self.data(key).unwrap_or(value))
                }
            }
            Err(source) => {
                if let Some(mut entry) = self.entries.get_mut(key) {
                    if entry.fetch_generation == generation {
                        entry.last_error = Some(source.clone());
                    }
                }
                Err(CacheError::Fetch {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    fn begin_fetch(&self, key: &CacheKey) -> u64 {
        let version = self.next_version();
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::empty(version));
        entry.fetch_generation += 1;
        entry.fetch_generation
    }

    fn finish_fetch(&self, key: &CacheKey, generation: u64, value: serde_json::Value) -> bool {
        let version = self.next_version();
        let Some(mut entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.fetch_generation != generation {
            return false;
        }
        entry.data = Some(value);
        entry.status = EntryStatus::Fresh;
        entry.version = version;
        entry.updated_at = utils::now_millis();
        entry.last_error = None;
        true
    }

    /// Make any in-flight refetch of `key` land as a no-op. Best effort: the
    /// request itself still completes.
    pub fn cancel(&self, key: &CacheKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.fetch_generation += 1;
            debug!("Cancelled in-flight refetch of {}", key);
        }
    }

    /// Mark every cached entry matching `pattern` stale and, unless disabled
    /// in settings, refetch them concurrently. Refetch failures are logged
    /// and leave the previous data in place.
    ///
    /// Returns the number of entries invalidated.
    pub async fn invalidate(&self, pattern: &KeyPattern) -> usize {
        let keys = self.keys_matching(pattern);
        for key in &keys {
            if let Some(mut entry) = self.entries.get_mut(key) {
                entry.status = EntryStatus::Stale;
            }
        }

        if self.settings.refetch_on_invalidate {
            let results = join_all(keys.iter().map(|key| self.refetch(key))).await;
            for (key, result) in keys.iter().zip(results) {
                if let Err(e) = result {
                    warn!("Refetch after invalidating {} failed: {}", key, e);
                }
            }
        }

        keys.len()
    }

    pub(crate) fn snapshot(&self, key: &CacheKey) -> Snapshot {
        match self.entries.get(key) {
            Some(entry) => Snapshot::Present {
                data: entry.data.clone(),
                status: entry.status,
            },
            None => Snapshot::Absent,
        }
    }

    /// Write `data` into `key`, creating the entry if needed.
    pub(crate) fn write(
        &self,
        key: &CacheKey,
        data: Option<serde_json::Value>,
        status: EntryStatus,
    ) {
        let version = self.next_version();
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::empty(version));
        entry.data = data;
        entry.status = status;
        entry.version = version;
        entry.updated_at = utils::now_millis();
        entry.last_error = None;
    }

    pub(crate) fn restore(&self, key: &CacheKey, snapshot: Snapshot) {
        match snapshot {
            Snapshot::Absent => {
                self.entries.remove(key);
            }
            Snapshot::Present { data, status } => {
                let status = if status == EntryStatus::Optimistic {
                    // Snapshot taken over another mutation's speculation.
                    EntryStatus::Stale
                } else {
                    status
                };
                self.write(key, data, status);
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &CacheKey, value: serde_json::Value) -> Result<T, CacheError> {
    serde_json::from_value(value).map_err(|e| CacheError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
