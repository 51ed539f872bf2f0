//! Deterministic query identity.
//!
//! Format: `METHOD:endpoint:hash`, where `hash` is the first 8 bytes of the
//! SHA-256 of the body's canonical JSON, hex-encoded. `serde_json` objects
//! keep keys sorted, so key order in the caller's value does not matter.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::request::{RequestBody, RequestSpec};

/// Bytes of the digest kept in the fingerprint.
const HASH_BYTES: usize = 8;

/// Identity of a request for caching and state tracking.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    /// Fingerprint of a method, endpoint and body.
    pub fn new(method: &str, endpoint: &str, body: &RequestBody) -> Self {
        let canonical = body.canonical().to_string();
        let digest = Sha256::digest(canonical.as_bytes());

        let mut hash = String::with_capacity(HASH_BYTES * 2);
        for byte in &digest[..HASH_BYTES] {
            let _ = write!(hash, "{byte:02x}");
        }

        Self(format!("{method}:{endpoint}:{hash}"))
    }

    /// Fingerprint of a full request description.
    pub fn of(spec: &RequestSpec) -> Self {
        Self::new(spec.method.as_str(), &spec.endpoint, &spec.body)
    }

    /// The fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
