use async_trait::async_trait;
use discuit_core::DiscuitError;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;

/// A single HTTP exchange with the API.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub data: Value,
    pub headers: HeaderMap,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Performs HTTP requests against the API.
///
/// The production implementation is [`crate::http::HttpFetch`]; tests plug in
/// [`crate::testing::RecordedFetch`]. Implementations own the csrf token and
/// session cookie and attach them to every request once obtained.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Makes a request to the API. `path` is relative to the base URL and may
    /// carry a query string. `body` is sent as JSON on POST and PUT.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<FetchResponse, DiscuitError>;

    /// Whether a csrf token has been obtained.
    fn has_token(&self) -> bool;

    /// The current csrf token, if any.
    fn token(&self) -> Option<String>;
}

/// Extracts a usable csrf token from the `csrf-token` response header, which
/// may arrive as a comma-separated list. The first non-empty segment wins.
pub fn format_token(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Appends a query parameter to `path`, using `?` or `&` as appropriate.
pub(crate) fn push_query(path: &mut String, key: &str, value: &str) {
    path.push(if path.contains('?') { '&' } else { '?' });
    path.push_str(key);
    path.push('=');
    path.push_str(value);
}
