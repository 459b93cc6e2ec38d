//! # Routing Configuration Utilities
//!
//! Identifier generation, timestamps and content fingerprints.
//!
//! # Best Practices
//!
//! - Uses SHA-2 for fingerprints
//! - Uses UUID v4 for identifiers

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix marking identifiers synthesized client-side for speculative rows.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Generate UUID v4 string
#[must_use]
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a temporary identifier for an optimistically created row.
///
/// # Examples
///
/// ```
/// let id = utils::generate_temp_id();
/// assert!(utils::is_temp_id(&id));
/// ```
#[must_use]
pub fn generate_temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4())
}

/// Whether an identifier was synthesized locally and never persisted.
#[must_use]
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Current wall clock in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Compute SHA-256 fingerprint of a JSON document.
///
/// Object keys are serialized in `serde_json`'s map order, so two values
/// that compare equal produce the same fingerprint.
#[must_use]
pub fn fingerprint(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
