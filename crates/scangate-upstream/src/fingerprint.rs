//! Content fingerprints used as cache keys.
//!
//! A fingerprint is SHA-256 over a canonical JSON rendering of the scan
//! profile and the contents. Transaction ids and caller metadata are not
//! inputs, so retried or re-labelled calls with the same content share a key.

use std::fmt;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::types::{ScanContent, ScanProfile};

/// Hex-encoded SHA-256 cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a synchronous scan.
///
/// Inputs go through typed structs first, so field order in the caller's
/// JSON never changes the key.
pub fn fingerprint(
    profile: &ScanProfile,
    contents: &[ScanContent],
) -> Result<Fingerprint, serde_json::Error> {
    let canonical = json!({
        "op": "scan",
        "profile": profile,
        "contents": contents,
    });
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(Fingerprint(format!("{:x}", Sha256::digest(&bytes))))
}
