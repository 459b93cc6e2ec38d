//! History rows recorded on every committed write.

use rc_core::{MutationKind, OrganizationId, ProjectId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bookkeeping fields left out of diffs.
const UNTRACKED_FIELDS: &[&str] = &["id", "createdAt", "createdBy", "updatedAt", "updatedBy"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigHistoryRow {
    pub history_id: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub operation: MutationKind,
    /// `organization` or `project`.
    pub scope: String,
    pub config_id: String,
    pub diff: Value,
    pub performed_by: UserId,
    pub performed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHistoryRow {
    pub id: String,
    pub organization_id: OrganizationId,
    pub provider_id: String,
    pub event_type: MutationKind,
    pub changed_fields: Value,
    pub actor_id: UserId,
    pub created_at: i64,
}

/// Field-level `{from, to}` diff between two serialized records. A missing
/// side counts as `null`.
pub fn diff(before: Option<&Value>, after: Option<&Value>) -> Value {
    let empty = Map::new();
    let before = before.and_then(Value::as_object).unwrap_or(&empty);
    let after = after.and_then(Value::as_object).unwrap_or(&empty);

    let mut changes = Map::new();
    for field in before.keys().chain(after.keys()) {
        if UNTRACKED_FIELDS.contains(&field.as_str()) || changes.contains_key(field) {
            continue;
        }
        let from = before.get(field).unwrap_or(&Value::Null);
        let to = after.get(field).unwrap_or(&Value::Null);
        if from != to {
            changes.insert(
                field.clone(),
                serde_json::json!({"from": from, "to": to}),
            );
        }
    }
    Value::Object(changes)
}

/// An update that only flips `enabled` is recorded as a toggle.
pub fn classify(kind: MutationKind, changes: &Value) -> MutationKind {
    let only_enabled = changes
        .as_object()
        .is_some_and(|fields| fields.len() == 1 && fields.contains_key("enabled"));
    if kind == MutationKind::Update && only_enabled {
        MutationKind::Toggle
    } else {
        kind
    }
}
