use crate::normalize::NormalizationMode;
use crate::storage::FingerprintStore;
use crate::types::{Fingerprint, FingerprintRecord};

/// Result of comparing fresh content against the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Nothing stored yet; the caller establishes the baseline silently
    NoBaseline,
    Unchanged,
    Changed { old: Fingerprint, new: Fingerprint },
}

/// Fresh content after normalization and digesting, with its verdict.
#[derive(Debug, Clone)]
pub struct Observation {
    pub detection: Detection,
    pub fingerprint: Fingerprint,
    /// The normalized content, which is what snapshots and diffs are built on
    pub normalized: String,
}

/// Decides whether a label's content changed since the stored record.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    mode: NormalizationMode,
}

impl ChangeDetector {
    pub fn new(mode: NormalizationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> NormalizationMode {
        self.mode
    }

    /// Normalize and digest `content`.
    pub fn fingerprint(&self, content: &str) -> (Fingerprint, String) {
        let normalized = self.mode.apply(content).into_owned();
        (Fingerprint::of(normalized.as_bytes()), normalized)
    }

    /// Compare `content` for `label` against `store`.
    pub fn detect(&self, label: &str, content: &str, store: &FingerprintStore) -> Observation {
        let (fingerprint, normalized) = self.fingerprint(content);
        let previous = store.get(label);
        let detection = self.compare(label, previous.as_ref(), fingerprint);

        Observation {
            detection,
            fingerprint,
            normalized,
        }
    }

    /// Pure comparison of a stored record against a fresh fingerprint.
    ///
    /// A record produced under another normalization mode cannot be compared
    /// and counts as no baseline.
    pub fn compare(
        &self,
        label: &str,
        previous: Option<&FingerprintRecord>,
        fingerprint: Fingerprint,
    ) -> Detection {
        match previous {
            None => Detection::NoBaseline,
            Some(record) if record.normalization != self.mode => {
                tracing::warn!(
                    label = %label,
                    stored = %record.normalization,
                    configured = %self.mode,
                    "Normalization mode changed since baseline, re-baselining"
                );
                Detection::NoBaseline
            }
            Some(record) if record.fingerprint == fingerprint => Detection::Unchanged,
            Some(record) => Detection::Changed {
                old: record.fingerprint,
                new: fingerprint,
            },
        }
    }
}
