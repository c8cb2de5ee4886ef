//! Deterministic request fingerprints

use sha2::{Digest, Sha256};
use shared::GenerationRequest;

use crate::types::Fingerprint;

/// Hash of (service, normalized payload, parameters).
///
/// Identical requests always produce the same fingerprint, whatever order they
/// are issued in and whatever `estimated_units` they carry.
pub fn fingerprint(request: &GenerationRequest) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(request.canonical_form().as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}
