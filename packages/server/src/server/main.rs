// Main entry point for the page-watch daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use page_watch::AddOutcome;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watch_server::{App, Config};

#[derive(Parser)]
#[command(name = "page-watch")]
#[command(about = "Watch web pages and get told when they change", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep on a schedule and answer chat commands until Ctrl-C (default)
    Run,
    /// Sweep every target once and exit
    Check,
    /// Start watching a page (the data directory must not be held by `run`)
    Add { label: String, url: String },
    /// Stop watching a page
    Remove { label: String },
    /// Show watched pages
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,page_watch=debug,watch_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let app = App::build(&config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            tracing::info!("Starting page-watch");

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                tracing::info!("Shutdown requested, finishing sweeps in flight");
                signal.cancel();
            });

            app.run(shutdown).await?;
        }
        Commands::Check => {
            let report = app.scheduler.sweep().await;
            println!(
                "{} targets: {} baseline, {} unchanged, {} changed, {} failed, {} skipped",
                report.targets,
                report.baselines,
                report.unchanged,
                report.changed,
                report.fetch_failed + report.store_failed + report.crashed,
                report.skipped,
            );
        }
        Commands::Add { label, url } => match app.commands.add(&label, &url).await? {
            AddOutcome::Monitoring { fingerprint } => {
                println!("Monitoring {} ({})", label, fingerprint.short());
            }
            AddOutcome::BaselinePending(e) => {
                println!("Monitoring {} (first check failed: {})", label, e);
            }
        },
        Commands::Remove { label } => {
            let target = app.commands.remove(&label).await?;
            println!("Removed {} ({})", target.label, target.url);
        }
        Commands::List => {
            let targets = app.commands.list();
            if targets.is_empty() {
                println!("No URLs are being tracked.");
            }
            for (label, url) in targets {
                println!("{}: {}", label, url);
            }
        }
    }

    Ok(())
}
