//! Transport abstraction layer for real and simulated HTTP
//!
//! Provides the two request surfaces applications use: [`HttpTransport`],
//! an async fetch-style call, and [`RequestObject`], an event-driven request
//! handle. Both are reached through a [`TransportRegistry`] so the simulation
//! can swap them out and restore them later.

pub mod registry;
pub mod request;
pub mod simulation;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
pub use registry::{Interceptor, RestoreHandle, TransportRegistry};
pub use request::{
    ReadyState, RequestEvent, RequestFactory, RequestListener, RequestObject, RequestStateError,
    TransportRequest, TransportRequestFactory,
};
pub use reqwest::Method;
use serde::de::DeserializeOwned;
pub use simulation::StaticTransport;

/// Outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a request with no headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// HTTP response abstraction
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code (200, 404, 500, etc.)
    pub status_code: u16,
    /// Reason phrase accompanying the status code
    pub status_text: String,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Response body bytes
    pub body: Bytes,
}

impl HttpResponse {
    /// Create new HTTP response with status code and body
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status_code)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status_code,
            status_text,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Overrides the reason phrase.
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true if the HTTP status code indicates success (2xx).
    pub fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }

    /// Returns the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Interprets the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// - `std::str::Utf8Error` - If the body is not valid UTF-8
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// - `serde_json::Error` - If the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Failures produced by a transport before a response is available.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Invalid request to {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("Failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("HTTP client could not be created: {reason}")]
    Client { reason: String },
}

/// Fetch-style transport: one async call per request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs the request and returns the response.
    ///
    /// # Errors
    ///
    /// - `TransportError` - If no response could be obtained
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production HTTP transport using reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a new production transport with the specified timeout.
    ///
    /// # Errors
    ///
    /// - `TransportError::Client` - If the underlying client cannot be built
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("netlag/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| TransportError::Client {
                reason: e.to_string(),
            })?;

        Ok(Self { client, timeout })
    }

    /// Returns current timeout setting
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { url: url.clone() }
            } else if e.is_connect() {
                TransportError::Connect {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            } else {
                TransportError::Request {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| TransportError::Body {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(HttpResponse {
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
