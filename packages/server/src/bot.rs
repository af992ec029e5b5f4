//! Chat command loop.
//!
//! ```text
//! ChatBot::run
//!     └─► getUpdates (long poll)
//!             └─► message from the configured chat, starting with '/'
//!                     ├─► ChatCommand::parse
//!                     ├─► Commands::{add, remove, list}
//!                     └─► sendMessage (reply)
//! ```

use std::time::Duration;

use page_watch::{AddOutcome, Commands, RegistryError};
use telegram::models::Update;
use telegram::TelegramService;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    Add { label: String, url: String },
    /// `/add` with too few arguments
    AddUsage,
    Remove { label: Option<String> },
    List,
    Unknown,
}

impl ChatCommand {
    /// Parse a message. Anything not starting with `/` is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?.strip_prefix('/')?;
        // Group chats address commands as /add@SomeBot
        let name = head.split('@').next().unwrap_or(head);

        let command = match name {
            "start" | "help" => Self::Start,
            "add" => match (words.next(), words.next()) {
                (Some(label), Some(url)) => Self::Add {
                    label: label.to_string(),
                    url: url.to_string(),
                },
                _ => Self::AddUsage,
            },
            "remove" => Self::Remove {
                label: words.next().map(String::from),
            },
            "list" => Self::List,
            _ => Self::Unknown,
        };
        Some(command)
    }
}

/// Run `command` against the registry and produce the reply text.
pub async fn execute(commands: &Commands, command: ChatCommand) -> String {
    match command {
        ChatCommand::Start => "✅ Ready! Use /add [label] [url]".to_string(),
        ChatCommand::AddUsage => "Usage: /add [label] [url]".to_string(),
        ChatCommand::Add { label, url } => match commands.add(&label, &url).await {
            Ok(AddOutcome::Monitoring { .. }) => format!("✅ Monitoring {}", label),
            Ok(AddOutcome::BaselinePending(e)) => format!(
                "✅ Monitoring {} (first check failed: {}; retrying on the next sweep)",
                label, e
            ),
            Err(e) => registry_error_reply(&e),
        },
        ChatCommand::Remove { label: None } => "Usage: /remove [label]".to_string(),
        ChatCommand::Remove { label: Some(label) } => match commands.remove(&label).await {
            Ok(_) => format!("❌ Removed {}", label),
            Err(e) => registry_error_reply(&e),
        },
        ChatCommand::List => {
            let targets = commands.list();
            if targets.is_empty() {
                return "No URLs are being tracked.".to_string();
            }
            targets
                .iter()
                .map(|(label, url)| format!("{}: {}", label, url))
                .collect::<Vec<_>>()
                .join("\n")
        }
        ChatCommand::Unknown => "Unrecognized command. Try /add or /list.".to_string(),
    }
}

fn registry_error_reply(error: &RegistryError) -> String {
    match error {
        RegistryError::DuplicateLabel { .. } => "Label already exists!".to_string(),
        RegistryError::UnknownLabel { .. } => "Label not found!".to_string(),
        RegistryError::InvalidLabel { .. } | RegistryError::InvalidUrl { .. } => {
            format!("⚠️ {}", error)
        }
        RegistryError::Storage(e) => format!("⚠️ Could not save: {}", e),
    }
}

pub struct ChatBot {
    service: TelegramService,
    commands: Commands,
    chat_id: String,
}

impl ChatBot {
    pub fn new(service: TelegramService, commands: Commands, chat_id: impl Into<String>) -> Self {
        Self {
            service,
            commands,
            chat_id: chat_id.into(),
        }
    }

    /// Poll for commands until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(chat_id = %self.chat_id, "Chat command loop started");
        let mut offset = None;

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.service.get_updates(offset, LONG_POLL_TIMEOUT) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.dispatch(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Polling for chat updates failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("Chat command loop stopped");
    }

    async fn dispatch(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.as_deref() else {
            return;
        };

        let chat_id = message.chat.id.to_string();
        if chat_id != self.chat_id {
            debug!(chat_id = %chat_id, "Ignoring message from unconfigured chat");
            return;
        }

        let Some(command) = ChatCommand::parse(text) else {
            return;
        };
        debug!(command = ?command, "Chat command received");

        let reply = execute(&self.commands, command).await;
        if let Err(e) = self.service.send_message(&chat_id, &reply).await {
            warn!(error = %e, "Failed to send chat reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_watch::testing::{MockFetcher, RecordingNotifier};
    use page_watch::{FingerprintStore, TargetRegistry, WatchConfig, Watcher};
    use std::sync::Arc;

    fn commands(fetcher: MockFetcher) -> (Commands, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Watcher::new(
            WatchConfig::new(dir.path()),
            Arc::new(TargetRegistry::in_memory()),
            Arc::new(FingerprintStore::in_memory()),
            Arc::new(fetcher),
            Arc::new(RecordingNotifier::new()),
        );
        (Commands::new(Arc::new(watcher)), dir)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(ChatCommand::parse("hello"), None);
        assert_eq!(ChatCommand::parse("/start"), Some(ChatCommand::Start));
        assert_eq!(
            ChatCommand::parse("/add@WatchBot home https://a.test/"),
            Some(ChatCommand::Add {
                label: "home".into(),
                url: "https://a.test/".into()
            })
        );
        assert_eq!(ChatCommand::parse("/add home"), Some(ChatCommand::AddUsage));
        assert_eq!(
            ChatCommand::parse("/remove"),
            Some(ChatCommand::Remove { label: None })
        );
        assert_eq!(ChatCommand::parse("/frobnicate"), Some(ChatCommand::Unknown));
    }

    #[tokio::test]
    async fn add_list_remove_conversation() {
        let (commands, _dir) = commands(MockFetcher::new().with_page("https://a.test/", "A"));

        let reply = execute(&commands, ChatCommand::parse("/list").unwrap()).await;
        assert_eq!(reply, "No URLs are being tracked.");

        let reply = execute(&commands, ChatCommand::parse("/add home https://a.test/").unwrap()).await;
        assert_eq!(reply, "✅ Monitoring home");

        let reply = execute(&commands, ChatCommand::parse("/add home https://b.test/").unwrap()).await;
        assert_eq!(reply, "Label already exists!");

        let reply = execute(&commands, ChatCommand::parse("/list").unwrap()).await;
        assert_eq!(reply, "home: https://a.test/");

        let reply = execute(&commands, ChatCommand::parse("/remove home").unwrap()).await;
        assert_eq!(reply, "❌ Removed home");

        let reply = execute(&commands, ChatCommand::parse("/remove home").unwrap()).await;
        assert_eq!(reply, "Label not found!");
    }

    #[tokio::test]
    async fn unknown_command_gets_hint() {
        let (commands, _dir) = commands(MockFetcher::new());
        let reply = execute(&commands, ChatCommand::Unknown).await;
        assert_eq!(reply, "Unrecognized command. Try /add or /list.");
    }

    #[tokio::test]
    async fn unreachable_page_is_still_registered() {
        let (commands, _dir) = commands(MockFetcher::new());
        let reply = execute(
            &commands,
            ChatCommand::parse("/add home https://down.test/").unwrap(),
        )
        .await;
        assert!(reply.starts_with("✅ Monitoring home (first check failed"));
    }
}
