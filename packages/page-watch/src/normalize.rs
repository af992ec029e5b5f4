//! Content normalization applied before fingerprinting.
//!
//! The mode is fixed per deployment. Records remember the mode that produced
//! them so a configuration change re-baselines instead of reporting a change.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use scraper::Html;
use serde::{Deserialize, Serialize};

/// Elements whose text never reaches the reader
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// How fetched content is turned into the bytes fed to the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMode {
    /// The rendered markup as fetched
    #[default]
    Raw,
    /// Each line trimmed, blank lines dropped
    Trimmed,
    /// Visible text only, one text run per line
    Text,
}

impl NormalizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Trimmed => "trimmed",
            Self::Text => "text",
        }
    }

    /// Apply this mode to fetched content.
    pub fn apply<'a>(&self, content: &'a str) -> Cow<'a, str> {
        match self {
            Self::Raw => Cow::Borrowed(content),
            Self::Trimmed => Cow::Owned(trim_lines(content)),
            Self::Text => Cow::Owned(visible_text(content)),
        }
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "html" => Ok(Self::Raw),
            "trimmed" | "lines" => Ok(Self::Trimmed),
            "text" | "visible" => Ok(Self::Text),
            other => Err(format!(
                "unknown normalization mode {:?} (expected raw, trimmed or text)",
                other
            )),
        }
    }
}

fn trim_lines(content: &str) -> String {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn visible_text(content: &str) -> String {
    let document = Html::parse_document(content);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| HIDDEN_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }

        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }

    lines.join("\n")
}
