//! # Routing Configuration Errors
//!
//! Error taxonomy shared by the RPC boundary, the query cache, the mutation
//! coordinator and the dirty-form registry.
//!
//! - Uses `thiserror` for structured error definitions
//! - Named fields in every variant
//! - `MutationError` is `Clone` so one rejection can be reported by a batch
//!   while each concurrent save keeps its own copy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced to callers of any mutating (or fetching) operation.
///
/// All four variants roll the cache back to the pre-mutation snapshot. Only
/// `Validation` is raised before the RPC is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutationError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Conflict on {resource}:{id}: {details}")]
    Conflict {
        resource: String,
        id: String,
        details: String,
    },

    #[error("Resource not found: {resource}:{id}")]
    NotFound { resource: String, id: String },

    #[error("Transport failure: {reason}")]
    Transport { reason: String },
}

impl MutationError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(
        resource: impl Into<String>,
        id: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            resource: resource.into(),
            id: id.into(),
            details: details.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::Validation { .. } => "validation",
            MutationError::Conflict { .. } => "conflict",
            MutationError::NotFound { .. } => "not_found",
            MutationError::Transport { .. } => "transport",
        }
    }

    /// Whether retrying the same request can succeed without user edits.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MutationError::Conflict { .. } | MutationError::Transport { .. }
        )
    }

    /// Whether the request was rejected before reaching the RPC layer.
    pub fn is_client_side(&self) -> bool {
        matches!(self, MutationError::Validation { .. })
    }
}

/// Dirty-form failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("Form {form_id} failed to save: {source}")]
    SaveFailed {
        form_id: String,
        #[source]
        source: MutationError,
    },

    #[error("Form {form_id} failed to reset: {reason}")]
    ResetFailed { form_id: String, reason: String },
}

impl FormError {
    pub fn form_id(&self) -> &str {
        match self {
            FormError::SaveFailed { form_id, .. } | FormError::ResetFailed { form_id, .. } => {
                form_id
            }
        }
    }
}

/// Query cache read failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("Cached data for {key} could not be decoded: {reason}")]
    Decode { key: String, reason: String },

    #[error("Fetch of {key} failed: {source}")]
    Fetch {
        key: String,
        #[source]
        source: MutationError,
    },
}

impl From<CacheError> for MutationError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Fetch { source, .. } => source,
            CacheError::Decode { key, reason } => MutationError::Transport {
                reason: format!("undecodable response for {key}: {reason}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_error_display() {
        let errors = vec![
            (
                MutationError::validation("costBias", "must be within 0..=1"),
                "Validation failed: costBias - must be within 0..=1",
            ),
            (
                MutationError::conflict("project_config", "pc-1", "stale updatedAt"),
                "Conflict on project_config:pc-1: stale updatedAt",
            ),
            (
                MutationError::not_found("organization_config", "org-x"),
                "Resource not found: organization_config:org-x",
            ),
            (
                MutationError::transport("connection reset"),
                "Transport failure: connection reset",
            ),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_retryable_and_client_side() {
        assert!(MutationError::transport("x").is_retryable());
        assert!(MutationError::conflict("r", "i", "d").is_retryable());
        assert!(!MutationError::not_found("r", "i").is_retryable());
        assert!(MutationError::validation("f", "r").is_client_side());
        assert!(!MutationError::transport("x").is_client_side());
    }

    #[test]
    fn test_form_error_keeps_source() {
        let err = FormError::SaveFailed {
            form_id: "routing".to_string(),
            source: MutationError::transport("timeout"),
        };
        assert_eq!(err.form_id(), "routing");
        assert!(err.to_string().contains("Transport failure: timeout"));
    }

    #[test]
    fn test_cache_error_converts_to_mutation_error() {
        let fetch = CacheError::Fetch {
            key: "k".to_string(),
            source: MutationError::not_found("project_config", "p"),
        };
        assert_eq!(
            MutationError::from(fetch),
            MutationError::not_found("project_config", "p")
        );

        let decode = CacheError::Decode {
            key: "k".to_string(),
            reason: "bad".to_string(),
        };
        assert_eq!(MutationError::from(decode).kind(), "transport");
    }
}
