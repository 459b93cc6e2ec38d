use metrics::{counter, histogram};
use rc_core::{MutationKind, ResourceKind};

/// Metrics for cache traffic and the mutation lifecycle.
///
/// Recording is a no-op unless a `metrics` recorder is installed, and is
/// skipped entirely when disabled through settings.
#[derive(Debug, Clone)]
pub struct CacheTelemetry {
    enabled: bool,
}

impl Default for CacheTelemetry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CacheTelemetry {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn record_mutation(
        &self,
        resource: ResourceKind,
        kind: MutationKind,
        outcome: &str,
        duration_ms: f64,
    ) {
        if !self.enabled {
            return;
        }
        let labels = [
            ("resource", resource.to_string()),
            ("kind", kind.to_string()),
            ("outcome", outcome.to_string()),
        ];
        counter!("rc_mutations_total", &labels).increment(1);

        let histogram_labels = [
            ("resource", resource.to_string()),
            ("kind", kind.to_string()),
        ];
        histogram!("rc_mutation_duration_seconds", &histogram_labels).record(duration_ms / 1000.0);
    }

    pub fn record_rollback(&self, resource: ResourceKind, entries: usize) {
        if !self.enabled {
            return;
        }
        counter!("rc_mutation_rollbacks_total",
            "resource" => resource.to_string()
        )
        .increment(1);
        counter!("rc_cache_entries_restored_total",
            "resource" => resource.to_string()
        )
        .increment(entries as u64);
    }

    pub fn record_refetch(&self, resource: ResourceKind, success: bool) {
        if !self.enabled {
            return;
        }
        counter!("rc_cache_refetches_total",
            "resource" => resource.to_string(),
            "status" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }

    pub fn record_discarded_response(&self, resource: ResourceKind) {
        if !self.enabled {
            return;
        }
        counter!("rc_cache_discarded_responses_total",
            "resource" => resource.to_string()
        )
        .increment(1);
    }

    pub fn record_hit(&self, resource: ResourceKind) {
        if !self.enabled {
            return;
        }
        counter!("rc_cache_hits_total", "resource" => resource.to_string()).increment(1);
    }

    pub fn record_miss(&self, resource: ResourceKind) {
        if !self.enabled {
            return;
        }
        counter!("rc_cache_misses_total", "resource" => resource.to_string()).increment(1);
    }
}
