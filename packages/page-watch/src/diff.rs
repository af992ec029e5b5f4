//! Bounded line diffs between two snapshots of a label.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::types::DiffArtifact;

/// Caps applied to every diff before it is stored or sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLimits {
    pub max_lines: usize,
    pub max_chars: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_lines: 40,
            max_chars: 3000,
        }
    }
}

const CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone)]
pub struct DiffProducer {
    limits: DiffLimits,
}

impl Default for DiffProducer {
    fn default() -> Self {
        Self::new(DiffLimits::default())
    }
}

impl DiffProducer {
    pub fn new(limits: DiffLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> DiffLimits {
        self.limits
    }

    /// Unified diff of `old` -> `new`, capped to the configured limits.
    ///
    /// No previous snapshot means a baseline transition, which has no diff.
    /// Identical snapshots also produce nothing.
    pub fn diff(&self, label: &str, old: Option<&str>, new: &str) -> Option<DiffArtifact> {
        let old = old?;
        if old == new {
            return None;
        }

        let text_diff = TextDiff::from_lines(old, new);
        let unified = text_diff
            .unified_diff()
            .context_radius(CONTEXT_LINES)
            .header("previous", "current")
            .to_string();

        if unified.trim().is_empty() {
            return None;
        }

        let (content, truncated) = cap(&unified, self.limits);

        Some(DiffArtifact {
            label: label.to_string(),
            produced_at: Utc::now(),
            content,
            truncated,
        })
    }
}

fn cap(text: &str, limits: DiffLimits) -> (String, bool) {
    let total_lines = text.lines().count();
    let mut out = String::new();
    let mut used_chars = 0;
    let mut kept = 0;
    let mut clipped = false;

    for line in text.lines() {
        if kept == limits.max_lines {
            break;
        }
        let cost = line.chars().count() + 1;
        if used_chars + cost > limits.max_chars {
            // Minified pages put everything on one line; show the start of
            // it rather than nothing.
            let room = limits.max_chars.saturating_sub(used_chars + 2);
            if room > 0 {
                out.extend(line.chars().take(room));
                out.push_str("…\n");
                kept += 1;
                clipped = true;
            }
            break;
        }
        out.push_str(line);
        out.push('\n');
        used_chars += cost;
        kept += 1;
    }

    let dropped = total_lines - kept;
    if dropped > 0 {
        out.push_str(&format!("… {} more lines\n", dropped));
    }
    (out, clipped || dropped > 0)
}
