//! Change messages and the log-only notifier.

use async_trait::async_trait;

use crate::error::NotifierError;
use crate::traits::Notifier;
use crate::types::{DiffArtifact, Target};

/// Longest message handed to a notifier (Telegram caps at 4096)
pub const MAX_MESSAGE_CHARS: usize = 4000;

const TRUNCATION_MARKER: &str = "…(truncated)";

/// The operator-facing text for a detected change.
pub fn change_message(target: &Target, diff: Option<&DiffArtifact>) -> String {
    let mut text = format!("🔔 {} changed!\n{}", target.label, target.url);

    if let Some(diff) = diff {
        text.push_str("\n\n");
        text.push_str(diff.content.trim_end());
    }

    truncate_message(text)
}

fn truncate_message(text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }

    let keep = MAX_MESSAGE_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated = text.chars().take(keep).collect::<String>();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Notifier that only writes to the log. Used when no chat is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), NotifierError> {
        tracing::info!(channel = %channel_id, message = %text, "Notification");
        Ok(())
    }
}
