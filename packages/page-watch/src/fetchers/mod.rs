//! Fetcher implementations.
//!
//! - [`HttpFetcher`] for pages whose markup is served as-is
//! - [`CommandFetcher`] for pages that need a real renderer (headless browser)

pub mod command;
pub mod http;

pub use command::CommandFetcher;
pub use http::HttpFetcher;

use url::Url;

use crate::error::{FetchError, FetchResult};

/// Parse `url` and reject anything that is not http(s).
pub(crate) fn parse_http_url(url: &str) -> FetchResult<Url> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
        url: url.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(FetchError::InvalidUrl {
            url: url.to_string(),
        }),
    }
}
