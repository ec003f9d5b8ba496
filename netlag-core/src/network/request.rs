//! Event-driven request objects.
//!
//! A [`RequestObject`] is opened, optionally given headers, then sent; the
//! outcome arrives later through registered listeners rather than as a
//! return value. [`TransportRequest`] implements this surface on top of any
//! [`HttpTransport`] by running the fetch on a spawned Tokio task.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

/// Lifecycle of a request object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Created but not opened
    Unsent,
    /// Opened and ready to send
    Opened,
    /// Sent and waiting for the transport
    Loading,
    /// Finished with a response, an error or an abort
    Done,
}

/// Notification delivered to request listeners.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    ReadyStateChange(ReadyState),
    Load(HttpResponse),
    Error(TransportError),
    Abort,
}

/// Callback receiving request events.
pub type RequestListener = Arc<dyn Fn(&RequestEvent) + Send + Sync>;

/// Misuse of the request object lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestStateError {
    #[error("Request must be opened before this operation")]
    NotOpened,

    #[error("Request has already been sent")]
    AlreadySent,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No async runtime available to send the request")]
    NoRuntime,
}

/// Event-driven request handle.
pub trait RequestObject: Send {
    /// Prepares the request, discarding any previous outcome.
    ///
    /// # Errors
    ///
    /// - `RequestStateError::InvalidUrl` - If `url` is not an absolute URL
    fn open(&mut self, method: Method, url: &str) -> Result<(), RequestStateError>;

    /// Adds a header to the pending request.
    ///
    /// # Errors
    ///
    /// - `RequestStateError::NotOpened` - If the request is not open or already sent
    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), RequestStateError>;

    /// Registers a listener for all subsequent events.
    fn add_event_listener(&mut self, listener: RequestListener);

    /// Starts the request. The outcome is delivered to listeners.
    ///
    /// # Errors
    ///
    /// - `RequestStateError::NotOpened` - If `open` has not been called
    /// - `RequestStateError::AlreadySent` - If the request is already in flight
    /// - `RequestStateError::NoRuntime` - If called outside a Tokio runtime
    fn send(&mut self, body: Option<Bytes>) -> Result<(), RequestStateError>;

    /// Cancels an in-flight request. No-op otherwise.
    fn abort(&mut self);

    /// Current lifecycle state.
    fn ready_state(&self) -> ReadyState;

    /// Response of a completed request.
    fn response(&self) -> Option<HttpResponse>;
}

/// Creates fresh request objects.
pub trait RequestFactory: Send + Sync {
    /// Returns a new, unopened request object.
    fn create(&self) -> Box<dyn RequestObject>;
}

pub(crate) fn dispatch(listeners: &[RequestListener], event: &RequestEvent) {
    for listener in listeners {
        listener(event);
    }
}

struct RequestState {
    method: Method,
    url: Option<String>,
    headers: Vec<(String, String)>,
    ready_state: ReadyState,
    response: Option<HttpResponse>,
    listeners: Vec<RequestListener>,
    // Bumped on open/abort so a stale task cannot publish its outcome.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Request object performing its fetch through an [`HttpTransport`].
pub struct TransportRequest {
    transport: Arc<dyn HttpTransport>,
    state: Arc<Mutex<RequestState>>,
}

impl TransportRequest {
    /// Creates an unopened request bound to `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(RequestState {
                method: Method::GET,
                url: None,
                headers: Vec::new(),
                ready_state: ReadyState::Unsent,
                response: None,
                listeners: Vec::new(),
                generation: 0,
                task: None,
            })),
        }
    }
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransportRequest")
            .field("method", &state.method)
            .field("url", &state.url)
            .field("ready_state", &state.ready_state)
            .finish()
    }
}

impl RequestObject for TransportRequest {
    fn open(&mut self, method: Method, url: &str) -> Result<(), RequestStateError> {
        url::Url::parse(url).map_err(|e| RequestStateError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let listeners = {
            let mut state = self.state.lock();
            if let Some(task) = state.task.take() {
                task.abort();
            }
            state.generation += 1;
            state.method = method;
            state.url = Some(url.to_string());
            state.headers.clear();
            state.response = None;
            state.ready_state = ReadyState::Opened;
            state.listeners.clone()
        };

        dispatch(&listeners, &RequestEvent::ReadyStateChange(ReadyState::Opened));
        Ok(())
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), RequestStateError> {
        let mut state = self.state.lock();
        if state.ready_state != ReadyState::Opened {
            return Err(RequestStateError::NotOpened);
        }
        state.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn add_event_listener(&mut self, listener: RequestListener) {
        self.state.lock().listeners.push(listener);
    }

    fn send(&mut self, body: Option<Bytes>) -> Result<(), RequestStateError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RequestStateError::NoRuntime)?;

        let (request, generation, listeners) = {
            let mut state = self.state.lock();
            match state.ready_state {
                ReadyState::Opened => {}
                ReadyState::Loading => return Err(RequestStateError::AlreadySent),
                ReadyState::Unsent | ReadyState::Done => return Err(RequestStateError::NotOpened),
            }
            let Some(url) = state.url.clone() else {
                return Err(RequestStateError::NotOpened);
            };
            state.ready_state = ReadyState::Loading;

            let request = HttpRequest {
                method: state.method.clone(),
                url,
                headers: state.headers.clone(),
                body,
            };
            (request, state.generation, state.listeners.clone())
        };

        dispatch(&listeners, &RequestEvent::ReadyStateChange(ReadyState::Loading));

        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let task = runtime.spawn(async move {
            let result = transport.fetch(request).await;

            let (event, listeners) = {
                let mut state = state.lock();
                if state.generation != generation {
                    return;
                }
                state.ready_state = ReadyState::Done;
                state.task = None;
                let event = match result {
                    Ok(response) => {
                        state.response = Some(response.clone());
                        RequestEvent::Load(response)
                    }
                    Err(error) => RequestEvent::Error(error),
                };
                (event, state.listeners.clone())
            };

            dispatch(&listeners, &RequestEvent::ReadyStateChange(ReadyState::Done));
            dispatch(&listeners, &event);
        });

        let mut state = self.state.lock();
        if state.generation == generation && state.ready_state == ReadyState::Loading {
            state.task = Some(task);
        }
        Ok(())
    }

    fn abort(&mut self) {
        let listeners = {
            let mut state = self.state.lock();
            if state.ready_state != ReadyState::Loading {
                return;
            }
            if let Some(task) = state.task.take() {
                task.abort();
            }
            state.generation += 1;
            state.ready_state = ReadyState::Done;
            state.listeners.clone()
        };

        dispatch(&listeners, &RequestEvent::ReadyStateChange(ReadyState::Done));
        dispatch(&listeners, &RequestEvent::Abort);
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn response(&self) -> Option<HttpResponse> {
        self.state.lock().response.clone()
    }
}

/// Factory producing [`TransportRequest`]s bound to one transport.
#[derive(Clone)]
pub struct TransportRequestFactory {
    transport: Arc<dyn HttpTransport>,
}

impl TransportRequestFactory {
    /// Creates a factory whose requests go through `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

impl RequestFactory for TransportRequestFactory {
    fn create(&self) -> Box<dyn RequestObject> {
        Box::new(TransportRequest::new(Arc::clone(&self.transport)))
    }
}
