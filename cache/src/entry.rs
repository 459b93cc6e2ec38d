use errors::MutationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Data matches the last successful fetch or commit.
    Fresh,
    /// Invalidated or never loaded; the next read refetches.
    Stale,
    /// Holds speculative data written by a mutation still in flight.
    Optimistic,
}

/// One cached query result.
///
/// `data` is `None` while the query has never produced a value (undefined)
/// and `Some(Value::Null)` when the server answered that the entity does not
/// exist.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: Option<serde_json::Value>,
    pub status: EntryStatus,
    /// Monotonically increasing stamp, bumped on every write to the entry.
    pub version: u64,
    pub updated_at: i64,
    pub last_error: Option<MutationError>,
    pub(crate) fetch_generation: u64,
}

impl CacheEntry {
    pub(crate) fn empty(version: u64) -> Self {
        Self {
            data: None,
            status: EntryStatus::Stale,
            version,
            updated_at: utils::now_millis(),
            last_error: None,
            fetch_generation: 0,
        }
    }

    pub fn is_fresh(&self, stale_time_ms: u64, now: i64) -> bool {
        match self.status {
            EntryStatus::Optimistic => true,
            EntryStatus::Stale => false,
            EntryStatus::Fresh => now.saturating_sub(self.updated_at) <= stale_time_ms as i64,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }
}

/// Pre-mutation state of one entry, restored on rollback.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Snapshot {
    Absent,
    Present {
        data: Option<serde_json::Value>,
        status: EntryStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_entry_goes_stale_after_window() {
        let mut entry = CacheEntry::empty(1);
        entry.status = EntryStatus::Fresh;
        entry.updated_at = 1_000;

        assert!(entry.is_fresh(500, 1_400));
        assert!(!entry.is_fresh(500, 1_600));
    }

    #[test]
    fn test_optimistic_entry_is_never_refetched_on_read() {
        let mut entry = CacheEntry::empty(1);
        entry.status = EntryStatus::Optimistic;
        entry.updated_at = 0;
        assert!(entry.is_fresh(0, i64::MAX));
    }

    #[test]
    fn test_empty_entry_is_unloaded_and_stale() {
        let entry = CacheEntry::empty(3);
        assert!(!entry.is_loaded());
        assert!(!entry.is_fresh(u64::MAX, entry.updated_at));
        assert_eq!(entry.version, 3);
    }
}
