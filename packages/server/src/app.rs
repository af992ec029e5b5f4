//! Process wiring: engine, collaborators and background services.

use std::sync::Arc;

use anyhow::{Context, Result};
use page_watch::{
    CommandFetcher, Commands, HttpFetcher, LogNotifier, Notifier, PageFetcher, Scheduler,
    StateExporter, Watcher,
};
use telegram::{TelegramOptions, TelegramService};
use tokio_util::sync::CancellationToken;

use crate::bot::ChatBot;
use crate::config::Config;
use crate::exporter::GitExporter;
use crate::notifier::TelegramNotifier;

/// Everything a running process needs.
pub struct App {
    pub watcher: Arc<Watcher>,
    pub scheduler: Scheduler,
    pub commands: Commands,
    /// Present when a Telegram bot is configured
    pub bot: Option<ChatBot>,
}

impl App {
    pub fn build(config: &Config) -> Result<Self> {
        let watch_config = config.watch_config();

        let fetcher: Arc<dyn PageFetcher> = match &config.render_command {
            Some(template) => Arc::new(
                CommandFetcher::from_template(template, config.settle_delay)
                    .map_err(anyhow::Error::msg)
                    .context("RENDER_COMMAND is invalid")?,
            ),
            None => Arc::new(
                HttpFetcher::new(config.fetch_timeout).context("Failed to build HTTP client")?,
            ),
        };

        let telegram = config.telegram.as_ref().map(|telegram| {
            TelegramService::new(
                TelegramOptions::new(telegram.bot_token.clone())
                    .with_request_timeout(config.delivery_timeout),
            )
        });

        let notifier: Arc<dyn Notifier> = match &telegram {
            Some(service) => Arc::new(TelegramNotifier::new(service.clone())),
            None => {
                tracing::warn!("TELEGRAM_TOKEN not set, changes will only be logged");
                Arc::new(LogNotifier)
            }
        };

        let mut watcher = Watcher::open(watch_config, fetcher, notifier)
            .context("Failed to open state in data directory")?;

        if let Some(git) = &config.git_export {
            let mut exporter = GitExporter::new(&config.data_dir);
            if let (Some(token), Some(repository)) = (&git.github_token, &git.repository) {
                exporter = exporter.with_github(token, repository);
            }
            watcher = watcher.with_exporter(Arc::new(exporter) as Arc<dyn StateExporter>);
        }

        for recovery in [watcher.registry().recovery(), watcher.store().recovery()]
            .into_iter()
            .flatten()
        {
            tracing::warn!(
                path = %recovery.path.display(),
                quarantined = ?recovery.quarantined,
                "Started from empty state after an unreadable state file"
            );
        }

        let watcher = Arc::new(watcher);
        let commands = Commands::new(watcher.clone());
        let bot = match (telegram, &config.telegram) {
            (Some(service), Some(telegram)) => Some(ChatBot::new(
                service,
                commands.clone(),
                telegram.chat_id.clone(),
            )),
            _ => None,
        };

        Ok(Self {
            scheduler: Scheduler::new(watcher.clone()),
            commands,
            watcher,
            bot,
        })
    }

    /// Run the scheduler and chat loop until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let bot = self.bot.map(|bot| tokio::spawn(bot.run(shutdown.clone())));

        self.scheduler.run(shutdown).await;

        if let Some(bot) = bot {
            bot.await.context("Chat command loop crashed")?;
        }
        Ok(())
    }
}
