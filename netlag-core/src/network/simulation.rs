//! In-memory transport for deterministic testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

enum Outcome {
    Respond(HttpResponse),
    Fail(TransportError),
}

/// Transport answering from predefined per-URL outcomes.
///
/// Returns canned responses or failures without touching the network and
/// counts every request it receives, which lets callers prove that a call
/// never reached the underlying transport. Unknown URLs get a 404.
#[derive(Default)]
pub struct StaticTransport {
    outcomes: RwLock<HashMap<String, Outcome>>,
    request_count: AtomicUsize,
}

impl StaticTransport {
    /// Creates a transport with no predefined outcomes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined response for a URL
    pub fn add_response(&self, url: &str, response: HttpResponse) {
        self.outcomes
            .write()
            .insert(url.to_string(), Outcome::Respond(response));
    }

    /// Add a predefined failure for a URL
    pub fn add_failure(&self, url: &str, error: TransportError) {
        self.outcomes
            .write()
            .insert(url.to_string(), Outcome::Fail(error));
    }

    /// Builder-style variant of [`Self::add_response`].
    pub fn with_response(self, url: &str, response: HttpResponse) -> Self {
        self.add_response(url, response);
        self
    }

    /// Builder-style variant of [`Self::add_failure`].
    pub fn with_failure(self, url: &str, error: TransportError) -> Self {
        self.add_failure(url, error);
        self
    }

    /// Number of requests this transport has served.
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for StaticTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        match self.outcomes.read().get(&request.url) {
            Some(Outcome::Respond(response)) => {
                tracing::debug!(url = %request.url, "Static transport: returning predefined response");
                Ok(response.clone())
            }
            Some(Outcome::Fail(error)) => {
                tracing::debug!(url = %request.url, "Static transport: returning predefined failure");
                Err(error.clone())
            }
            None => {
                tracing::debug!(url = %request.url, "Static transport: no outcome configured, returning 404");
                Ok(HttpResponse::new(404, "Not Found"))
            }
        }
    }
}
