//! # Audit Projector
//!
//! Maps history pages from different sources onto one [`AuditEntry`] shape.
//!
//! Each source has its own adapter function. Adapters never fail: a record
//! missing a field (or not even an object) still yields an entry with that
//! field defaulted, so one malformed row never hides the rest of a page.

use rc_core::{AuditEntry, HistorySource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// One fetched page of raw history records from a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub source: HistorySource,
    pub records: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl HistoryPage {
    pub fn new(source: HistorySource, records: Vec<Value>) -> Self {
        Self {
            source,
            records,
            next_cursor: None,
        }
    }
}

type Adapter = fn(&Value) -> AuditEntry;

fn adapter(source: HistorySource) -> Adapter {
    match source {
        HistorySource::Config => from_config_history,
        HistorySource::Provider => from_provider_history,
    }
}

/// Project one page. The output has exactly one entry per input record, in
/// input order.
pub fn project(page: &HistoryPage) -> Vec<AuditEntry> {
    let adapt = adapter(page.source);
    page.records.iter().map(adapt).collect()
}

/// Project several pages and merge them newest first.
pub fn merge_projected(pages: &[HistoryPage]) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = pages.iter().flat_map(project).collect();
    entries.sort_by(|a, b| {
        b.changed_at
            .cmp(&a.changed_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    entries
}

/// Configuration history row:
/// `historyId, operation, scope, configId, diff, performedBy, performedAt`.
pub fn from_config_history(record: &Value) -> AuditEntry {
    let scope = text(record, "scope");
    let entity_type = if scope.is_empty() {
        "config".to_string()
    } else {
        format!("{scope}_config")
    };

    AuditEntry {
        id: id_or_fingerprint(record, "historyId"),
        action: text(record, "operation"),
        changes: changes(record, "diff"),
        changed_by: text(record, "performedBy"),
        changed_at: millis(record, "performedAt"),
        entity_type,
        entity_id: text(record, "configId"),
    }
}

/// Provider connection history row:
/// `id, providerId, eventType, changedFields, actorId, createdAt`.
pub fn from_provider_history(record: &Value) -> AuditEntry {
    AuditEntry {
        id: id_or_fingerprint(record, "id"),
        action: text(record, "eventType"),
        changes: changes(record, "changedFields"),
        changed_by: text(record, "actorId"),
        changed_at: millis(record, "createdAt"),
        entity_type: "provider_connection".to_string(),
        entity_id: text(record, "providerId"),
    }
}

fn text(record: &Value, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn millis(record: &Value, field: &str) -> i64 {
    match record.get(field) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

fn changes(record: &Value, field: &str) -> Value {
    match record.get(field) {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(value) => value.clone(),
    }
}

fn id_or_fingerprint(record: &Value, field: &str) -> String {
    let id = text(record, field);
    if id.is_empty() {
        debug!("History record without {}, deriving id from content", field);
        return utils::fingerprint(record);
    }
    id
}
