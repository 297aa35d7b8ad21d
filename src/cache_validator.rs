use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Checksummed envelope for upstream payloads kept in the response cache.
///
/// Geocoder candidates and DVF section payloads are serialized to JSON, sealed
/// with a SHA-256 checksum on insert and verified on read. A mismatch means
/// the entry is discarded and the upstream is queried again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedCacheEntry {
    /// The cached payload (JSON string).
    pub data: String,
    /// SHA-256 checksum of the data (hex encoded).
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Serializes a value and wraps it. Returns `None` if the value cannot be
    /// serialized, in which case the caller simply skips caching.
    pub fn seal<T: Serialize>(value: &T) -> Option<String> {
        let data = serde_json::to_string(value).ok()?;
        serde_json::to_string(&Self::new(data)).ok()
    }

    /// Verifies a sealed entry and decodes the payload.
    ///
    /// Returns `None` for malformed envelopes, checksum mismatches, and
    /// payloads that no longer decode as `T`.
    pub fn open<T: DeserializeOwned>(serialized: &str) -> Option<T> {
        let entry: ValidatedCacheEntry = serde_json::from_str(serialized).ok()?;

        if !entry.is_valid() {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            return None;
        }

        serde_json::from_str(&entry.data).ok()
    }
}
