use crate::fetch::{format_token, Fetch, FetchResponse};
use async_trait::async_trait;
use discuit_core::DiscuitError;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER, SET_COOKIE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// The base url for the api.
pub const DEFAULT_BASE_URL: &str = "https://discuit.net/api";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

const CSRF_HEADER: &str = "csrf-token";

#[derive(Debug, Default)]
struct SessionState {
    csrf_token: Option<String>,
    cookie: Option<String>,
}

/// Fetcher backed by reqwest.
///
/// Captures the csrf token and session cookie from response headers and
/// attaches them to every subsequent request.
#[derive(Debug)]
pub struct HttpFetch {
    client: Client,
    base_url: String,
    state: Mutex<SessionState>,
}

impl HttpFetch {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static("https://discuit.net/"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stores any csrf token or cookies present in the response headers.
    /// The server may set several cookies in one response; all of them are
    /// kept and sent back as a single `Cookie` header.
    fn capture_session(&self, headers: &HeaderMap) {
        let mut state = self.state.lock().expect("session state lock poisoned");

        let cookies: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .collect();
        if !cookies.is_empty() {
            let cookie = cookies.join("; ");
            debug!(%cookie, "got session cookies");
            state.cookie = Some(cookie);
        }

        if let Some(raw) = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) {
            let token = format_token(raw);
            if !token.is_empty() {
                debug!(%token, "got csrf token");
                state.csrf_token = Some(token);
            }
        }
    }
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<FetchResponse, DiscuitError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method.clone(), &url);

        {
            let state = self.state.lock().expect("session state lock poisoned");
            if let Some(token) = &state.csrf_token {
                builder = builder.header("X-Csrf-Token", token);
            }
            if let Some(cookie) = &state.cookie {
                builder = builder.header(COOKIE, cookie);
            }
        }

        if matches!(method, Method::POST | Method::PUT) {
            if let Some(body) = &body {
                builder = builder.json(body);
            }
        }

        debug!(%method, path, "making request");
        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        self.capture_session(&headers);

        // Some endpoints answer with an empty body; treat anything that is
        // not valid JSON as null rather than failing the exchange.
        let text = response.text().await?;
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };

        Ok(FetchResponse {
            status,
            data,
            headers,
        })
    }

    fn has_token(&self) -> bool {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .csrf_token
            .is_some()
    }

    fn token(&self) -> Option<String> {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .csrf_token
            .clone()
    }
}
