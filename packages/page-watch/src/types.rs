use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{RegistryError, RegistryResult};
use crate::normalize::NormalizationMode;

/// Longest label accepted by the registry
pub const MAX_LABEL_LEN: usize = 64;

/// A watched resource: an operator-chosen label pointing at a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub label: String,
    pub url: String,
}

impl Target {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Check that a label is usable as a registry key and as a file name.
pub fn validate_label(label: &str) -> RegistryResult<()> {
    let invalid = |reason| RegistryError::InvalidLabel {
        label: label.to_string(),
        reason,
    };

    if label.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(invalid("must be at most 64 characters"));
    }
    if label.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid("may only contain letters, digits, '_', '-' and '.'"));
    }
    Ok(())
}

/// Check that a URL parses and uses http(s).
pub fn validate_url(url: &str) -> RegistryResult<Url> {
    let parsed = Url::parse(url).map_err(|e| RegistryError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RegistryError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme: {}", other),
            })
        }
    }

    if parsed.host_str().is_none() {
        return Err(RegistryError::InvalidUrl {
            url: url.to_string(),
            reason: "URL has no host".to_string(),
        });
    }

    Ok(parsed)
}

/// SHA-256 digest of normalized page content.
///
/// Persisted as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest already-normalized bytes.
    pub fn of(normalized: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(serde::de::Error::custom)
    }
}

/// A notification that was committed together with a fingerprint update
/// but not yet confirmed as attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotice {
    pub text: String,
    pub detected_at: DateTime<Utc>,
}

/// Last known state of one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub fingerprint: Fingerprint,
    pub captured_at: DateTime<Utc>,
    pub normalization: NormalizationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingNotice>,
}

impl FingerprintRecord {
    pub fn new(fingerprint: Fingerprint, normalization: NormalizationMode) -> Self {
        Self {
            fingerprint,
            captured_at: Utc::now(),
            normalization,
            snapshot: None,
            pending: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Option<String>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_pending(mut self, pending: PendingNotice) -> Self {
        self.pending = Some(pending);
        self
    }
}

/// Bounded, human-readable delta between two snapshots of a label.
/// Derived data; losing it never affects detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffArtifact {
    pub label: String,
    pub produced_at: DateTime<Utc>,
    pub content: String,
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_hex_round_trips_through_json() {
        let fp = Fingerprint::of(b"A");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json.len(), 66);
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
    }

    #[test]
    fn fingerprint_rejects_short_hex() {
        let err = serde_json::from_str::<Fingerprint>("\"abcd\"");
        assert!(err.is_err());
    }

    #[test]
    fn different_bytes_different_fingerprint() {
        assert_ne!(Fingerprint::of(b"A"), Fingerprint::of(b"B"));
        assert_eq!(Fingerprint::of(b"A"), Fingerprint::of(b"A"));
    }

    #[test]
    fn label_rules() {
        assert!(validate_label("home").is_ok());
        assert!(validate_label("shop-2.main_page").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label(".hidden").is_err());
        assert!(validate_label("a/b").is_err());
        assert!(validate_label("has space").is_err());
        assert!(validate_label(&"x".repeat(65)).is_err());
    }

    #[test]
    fn url_rules() {
        assert!(validate_url("https://example.test").is_ok());
        assert!(validate_url("http://example.test/path?q=1").is_ok());
        assert!(matches!(
            validate_url("ftp://example.test"),
            Err(RegistryError::InvalidUrl { .. })
        ));
        assert!(validate_url("not a url").is_err());
    }
}
