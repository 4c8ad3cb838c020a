//! Test doubles for the [`Fetch`] seam.
//!
//! [`RecordedFetch`] serves canned responses from registered routes and
//! records every request it sees, so tests can assert on the exact wire
//! traffic without a live server.

use crate::fetch::{Fetch, FetchResponse};
use async_trait::async_trait;
use discuit_core::DiscuitError;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Mutex;

/// A request as seen by the fetcher.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// The path with any query string stripped.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }
}

type Handler =
    Box<dyn Fn(&RecordedRequest) -> Result<FetchResponse, DiscuitError> + Send + Sync>;

/// Builds a JSON [`FetchResponse`] with the given status.
pub fn json_response(status: u16, data: Value) -> FetchResponse {
    FetchResponse {
        status: StatusCode::from_u16(status).expect("valid status code"),
        data,
        headers: HeaderMap::new(),
    }
}

/// A decode failure standing in for any transport-level error.
pub fn transport_error() -> DiscuitError {
    serde_json::from_str::<Value>("")
        .expect_err("empty input is not valid json")
        .into()
}

/// Fetcher used for testing.
///
/// Routes are matched on method plus path-without-query; unmatched requests
/// get a 404 with a null body (and are still recorded).
pub struct RecordedFetch {
    routes: Vec<(Method, String, Handler)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordedFetch {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Registers a handler for `method` + `path` (path compared without the
    /// query string).
    pub fn route(
        self,
        method: Method,
        path: &str,
        handler: impl Fn(&RecordedRequest) -> FetchResponse + Send + Sync + 'static,
    ) -> Self {
        self.try_route(method, path, move |req| Ok(handler(req)))
    }

    /// Registers a handler that may fail the exchange outright, as a broken
    /// connection would.
    pub fn try_route<F>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<FetchResponse, DiscuitError> + Send + Sync + 'static,
    {
        self.routes.push((method, path.to_string(), Box::new(handler)));
        self
    }

    /// Registers a route that always answers 200 with `data`.
    pub fn json_route(self, method: Method, path: &str, data: Value) -> Self {
        self.route(method, path, move |_| json_response(200, data.clone()))
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("request log lock poisoned").len()
    }

    /// Number of requests whose path-without-query equals `route`.
    pub fn requests_to(&self, route: &str) -> usize {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .iter()
            .filter(|r| r.route() == route)
            .count()
    }
}

impl Default for RecordedFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for RecordedFetch {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<FetchResponse, DiscuitError> {
        let request = RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body,
        };

        self.requests
            .lock()
            .expect("request log lock poisoned")
            .push(request.clone());

        for (route_method, route_path, handler) in &self.routes {
            if *route_method == method && route_path == request.route() {
                return handler(&request);
            }
        }

        Ok(json_response(404, Value::Null))
    }

    fn has_token(&self) -> bool {
        true
    }

    fn token(&self) -> Option<String> {
        Some("test-token".to_string())
    }
}
