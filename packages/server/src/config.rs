use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use page_watch::{DiffLimits, NormalizationMode, WatchConfig};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Telegram credentials. Present only when a bot token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Where and how persisted state is mirrored to a git remote.
#[derive(Debug, Clone)]
pub struct GitExportConfig {
    pub github_token: Option<String>,
    pub repository: Option<String>,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: Option<TelegramConfig>,
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
    pub first_sweep_delay: Duration,
    pub fetch_timeout: Duration,
    pub settle_delay: Duration,
    /// Bound on one chat notification
    pub delivery_timeout: Duration,
    /// Bound on one git export
    pub export_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub normalization: NormalizationMode,
    pub diff_limits: DiffLimits,
    /// Command template for an external renderer; plain HTTP when unset
    pub render_command: Option<String>,
    pub git_export: Option<GitExportConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any name -> value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = WatchConfig::default();

        let telegram = match var("TELEGRAM_TOKEN") {
            Some(bot_token) => Some(TelegramConfig {
                bot_token,
                chat_id: var("CHAT_ID").context("CHAT_ID must be set when TELEGRAM_TOKEN is")?,
            }),
            None => None,
        };

        let git_export = if parse_or(&var, "GIT_EXPORT", false)? {
            Some(GitExportConfig {
                github_token: var("GH_PAT"),
                repository: var("GITHUB_REPOSITORY"),
            })
        } else {
            None
        };

        let max_concurrent_fetches = parse_or(&var, "MAX_CONCURRENT_FETCHES", defaults.max_concurrency)?;
        if max_concurrent_fetches == 0 {
            bail!("MAX_CONCURRENT_FETCHES must be at least 1");
        }

        Ok(Self {
            telegram,
            data_dir: var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            poll_interval: Duration::from_secs(parse_or(
                &var,
                "POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            first_sweep_delay: Duration::from_secs(parse_or(
                &var,
                "FIRST_SWEEP_DELAY_SECS",
                defaults.first_sweep_delay.as_secs(),
            )?),
            fetch_timeout: Duration::from_secs(parse_or(
                &var,
                "FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            settle_delay: Duration::from_millis(parse_or(
                &var,
                "SETTLE_DELAY_MS",
                defaults.settle_delay.as_millis() as u64,
            )?),
            delivery_timeout: Duration::from_secs(parse_or(
                &var,
                "DELIVERY_TIMEOUT_SECS",
                defaults.delivery_timeout.as_secs(),
            )?),
            export_timeout: Duration::from_secs(parse_or(
                &var,
                "EXPORT_TIMEOUT_SECS",
                defaults.export_timeout.as_secs(),
            )?),
            max_concurrent_fetches,
            normalization: parse_or(&var, "NORMALIZATION", defaults.normalization)?,
            diff_limits: DiffLimits {
                max_lines: parse_or(&var, "DIFF_MAX_LINES", defaults.diff.max_lines)?,
                max_chars: parse_or(&var, "DIFF_MAX_CHARS", defaults.diff.max_chars)?,
            },
            render_command: var("RENDER_COMMAND"),
            git_export,
        })
    }

    /// Engine configuration derived from this one.
    pub fn watch_config(&self) -> WatchConfig {
        let channel_id = self
            .telegram
            .as_ref()
            .map(|telegram| telegram.chat_id.clone())
            .unwrap_or_else(|| "log".to_string());

        WatchConfig::new(&self.data_dir)
            .with_poll_interval(self.poll_interval)
            .with_first_sweep_delay(self.first_sweep_delay)
            .with_fetch_timeout(self.fetch_timeout)
            .with_settle_delay(self.settle_delay)
            .with_delivery_timeout(self.delivery_timeout)
            .with_export_timeout(self.export_timeout)
            .with_max_concurrency(self.max_concurrent_fetches)
            .with_normalization(self.normalization)
            .with_diff_limits(self.diff_limits)
            .with_channel_id(channel_id)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be valid: {}", name, e)),
        None => Ok(default),
    }
}
