// https://core.telegram.org/bots/api

use std::time::Duration;

pub mod models;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::{ApiResponse, GetUpdatesRequest, Message, SendMessageRequest, Update};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bound on a call that is not a long poll.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack added on top of a long-poll timeout before the HTTP request itself
/// is given up on.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },
}

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Debug, Clone)]
pub struct TelegramOptions {
    pub bot_token: String,
    /// Overridable for tests
    pub api_base: String,
    pub request_timeout: Duration,
}

impl TelegramOptions {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TelegramService {
    options: TelegramOptions,
    client: Client,
}

impl TelegramService {
    pub fn new(options: TelegramOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{base}/bot{token}/{method}",
            base = self.options.api_base.trim_end_matches('/'),
            token = self.options.bot_token,
            method = method
        )
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(self.method_url(method))
            .json(body)
            .timeout(timeout.unwrap_or(self.options.request_timeout));

        // The API answers errors with a JSON envelope and a non-2xx status,
        // so the body is parsed regardless of status.
        let response = request.send().await?;
        let status = response.status();
        let envelope = response.json::<ApiResponse<T>>().await?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => {
                let code = error_code.unwrap_or_else(|| i64::from(status.as_u16()));
                let description = description.unwrap_or_else(|| "no description".to_string());
                tracing::debug!(method = %method, code, description = %description, "Telegram API error");
                Err(TelegramError::Api { code, description })
            }
        }
    }

    /// Send a plain-text message to `chat_id`.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<Message> {
        let body = SendMessageRequest {
            chat_id,
            text,
            disable_web_page_preview: true,
        };
        self.call("sendMessage", &body, None).await
    }

    /// Long-poll for message updates newer than `offset`.
    ///
    /// Waits up to `timeout` for something to arrive; an empty list means the
    /// poll expired quietly.
    pub async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>> {
        let body = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &body, Some(timeout + LONG_POLL_GRACE))
            .await
    }
}
