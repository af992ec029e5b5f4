//! Fetcher that shells out to an external renderer.
//!
//! The renderer prints the settled DOM to stdout, e.g.
//!
//! ```text
//! chromium --headless=new --dump-dom --virtual-time-budget={settle_ms} {url}
//! ```

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::parse_http_url;
use crate::error::{FetchError, FetchResult};
use crate::traits::PageFetcher;

const URL_PLACEHOLDER: &str = "{url}";
const SETTLE_PLACEHOLDER: &str = "{settle_ms}";

/// Longest stderr excerpt carried in an error
const MAX_STDERR_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    settle: Duration,
}

impl CommandFetcher {
    /// Build from a whitespace-separated command template. The template must
    /// mention `{url}`; `{settle_ms}` is optional.
    pub fn from_template(template: &str, settle: Duration) -> Result<Self, String> {
        let mut parts = template.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| "render command is empty".to_string())?;
        let args = parts.collect::<Vec<_>>();

        if !args.iter().any(|arg| arg.contains(URL_PLACEHOLDER)) {
            return Err(format!(
                "render command must contain {} placeholder",
                URL_PLACEHOLDER
            ));
        }

        Ok(Self {
            program,
            args,
            settle,
        })
    }

    fn render_args(&self, url: &str) -> Vec<String> {
        let settle_ms = self.settle.as_millis().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(URL_PLACEHOLDER, url)
                    .replace(SETTLE_PLACEHOLDER, &settle_ms)
            })
            .collect()
    }
}

#[async_trait]
impl PageFetcher for CommandFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        // Only well-formed http(s) URLs reach the renderer's argv.
        let parsed = parse_http_url(url)?;
        let args = self.render_args(parsed.as_str());

        debug!(url = %url, program = %self.program, "Render starting");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::Render {
                url: url.to_string(),
                reason: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Render {
                url: url.to_string(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.chars().take(MAX_STDERR_CHARS).collect::<String>()
                ),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
