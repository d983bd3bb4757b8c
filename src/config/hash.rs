//! Deterministic hashing of manifests and reconcile outcomes.
//!
//! Everything hashed here serializes with ordered maps, so identical inputs
//! always give identical bytes and identical digests.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, StateError};
use crate::planner::ReconcileOutcome;

use super::manifest::ManifestConfig;

/// Hasher for manifests and outcomes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire manifest.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the manifest cannot be serialized.
    pub fn hash_manifest(&self, manifest: &ManifestConfig) -> Result<String> {
        Self::digest(manifest)
    }

    /// Fingerprints a reconcile outcome: resource, action, and changed fields.
    ///
    /// Two reconciliations of identical inputs produce the same fingerprint.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the outcome cannot be serialized.
    pub fn hash_outcome(&self, outcome: &ReconcileOutcome) -> Result<String> {
        Self::digest(outcome)
    }

    fn digest<T: Serialize>(value: &T) -> Result<String> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StateError::serialization(format!("Failed to serialize for hashing: {e}")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
