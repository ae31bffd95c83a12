//! # Cache Key Fingerprints
//!
//! Deterministic cache keys derived from query shape and tenant.
//!
//! A fingerprint is the SHA-256 of `(resource_kind, query params, workspace)`
//! with field separators, so distinct queries can never collide by
//! concatenation. `serde_json` serializes object keys in sorted order by
//! default, which makes the params encoding canonical: two parameter maps
//! with the same contents fingerprint identically regardless of insertion
//! order.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::sync::WorkspaceId;

/// Deterministic cache key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a query
    pub fn compute(resource_kind: &str, params: &Value, workspace: &WorkspaceId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(resource_kind.as_bytes());
        hasher.update([0x1f]);
        hasher.update(params.to_string().as_bytes());
        hasher.update([0x1f]);
        hasher.update(workspace.as_str().as_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars are enough to identify a key in logs
        let hex: String = self.0[..4].iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "Fingerprint({}..)", hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ws(id: &str) -> WorkspaceId {
        WorkspaceId::new(id)
    }

    #[test]
    fn test_deterministic() {
        let a = Fingerprint::compute("projects", &json!({"status": "active", "page": 1}), &ws("ws-42"));
        let b = Fingerprint::compute("projects", &json!({"page": 1, "status": "active"}), &ws("ws-42"));
        // Key order in the params map must not matter
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_inputs_distinct_keys() {
        let base = Fingerprint::compute("projects", &json!({"page": 1}), &ws("ws-42"));

        let other_kind = Fingerprint::compute("assets", &json!({"page": 1}), &ws("ws-42"));
        let other_params = Fingerprint::compute("projects", &json!({"page": 2}), &ws("ws-42"));
        let other_ws = Fingerprint::compute("projects", &json!({"page": 1}), &ws("ws-7"));

        assert_ne!(base, other_kind);
        assert_ne!(base, other_params);
        assert_ne!(base, other_ws);
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        let a = Fingerprint::compute("ab", &json!("c"), &ws("d"));
        let b = Fingerprint::compute("a", &json!("bc"), &ws("d"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_hex() {
        let fp = Fingerprint::compute("projects", &json!({}), &ws("ws-1"));
        let hex = fp.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
