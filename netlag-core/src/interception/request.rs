//! Simulating wrapper for event-driven request objects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use super::{PendingCall, Simulation};
use crate::network::request::dispatch;
use crate::network::{
    HttpResponse, Method, ReadyState, RequestEvent, RequestFactory, RequestListener,
    RequestObject, RequestStateError,
};

/// Factory wrapping every created request in a [`SimulatedRequest`].
pub struct SimulatedRequestFactory {
    original: Arc<dyn RequestFactory>,
    simulation: Arc<Simulation>,
}

impl SimulatedRequestFactory {
    pub(crate) fn new(original: Arc<dyn RequestFactory>, simulation: Arc<Simulation>) -> Self {
        Self {
            original,
            simulation,
        }
    }
}

impl RequestFactory for SimulatedRequestFactory {
    fn create(&self) -> Box<dyn RequestObject> {
        Box::new(SimulatedRequest::new(
            self.original.create(),
            Arc::clone(&self.simulation),
        ))
    }
}

/// Reports the outcome of a deferred send once the wrapped request finishes.
///
/// Registered as a listener on the wrapped request. Fires at most once; a
/// retired watch ignores later events so listeners left over from an earlier
/// open/send cycle stay silent.
struct CompletionWatch {
    call: PendingCall,
    simulation: Arc<Simulation>,
    retired: AtomicBool,
}

impl CompletionWatch {
    fn new(call: PendingCall, simulation: Arc<Simulation>) -> Self {
        Self {
            call,
            simulation,
            retired: AtomicBool::new(false),
        }
    }

    fn observe(&self, event: &RequestEvent) {
        let (outcome, is_error) = match event {
            RequestEvent::ReadyStateChange(_) => return,
            RequestEvent::Load(response) => (format!("completed with {}", response.status_code), false),
            RequestEvent::Error(error) => (format!("failed: {error}"), true),
            RequestEvent::Abort => ("aborted".to_string(), false),
        };
        self.finish(&outcome, is_error);
    }

    /// Logs `outcome` unless the watch already fired.
    fn finish(&self, outcome: &str, is_error: bool) {
        if !self.retired.swap(true, Ordering::SeqCst) {
            self.simulation.complete(&self.call, outcome, is_error);
        }
    }
}

#[derive(Default)]
struct Overlay {
    label: String,
    listeners: Vec<RequestListener>,
    synthetic: Option<HttpResponse>,
    pending: bool,
    // Bumped on open so a deferred send from an earlier cycle is discarded.
    generation: u64,
    watch: Option<Arc<CompletionWatch>>,
}

/// Request object whose `send` is deferred by the simulated delay.
///
/// Every other operation goes straight to the wrapped request. After the
/// delay the call either receives a synthetic error response, delivered to
/// listeners as a `Load` event without the wrapped request ever being sent,
/// or the wrapped request's own `send` runs. Aborting during the delay is
/// forwarded to the wrapped request but does not cancel the deferred send.
/// Re-opening during the delay discards the deferred send.
pub struct SimulatedRequest {
    inner: Arc<Mutex<Box<dyn RequestObject>>>,
    overlay: Arc<Mutex<Overlay>>,
    simulation: Arc<Simulation>,
}

impl SimulatedRequest {
    fn new(inner: Box<dyn RequestObject>, simulation: Arc<Simulation>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            overlay: Arc::new(Mutex::new(Overlay::default())),
            simulation,
        }
    }
}

impl RequestObject for SimulatedRequest {
    fn open(&mut self, method: Method, url: &str) -> Result<(), RequestStateError> {
        let label = format!("{method} {url}");
        self.inner.lock().open(method, url)?;

        let superseded = {
            let mut overlay = self.overlay.lock();
            overlay.label = label;
            overlay.synthetic = None;
            overlay.pending = false;
            overlay.generation += 1;
            overlay.watch.take()
        };
        if let Some(watch) = superseded {
            watch.finish("superseded by reopen", false);
        }
        Ok(())
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), RequestStateError> {
        {
            let overlay = self.overlay.lock();
            if overlay.pending || overlay.synthetic.is_some() {
                return Err(RequestStateError::NotOpened);
            }
        }
        self.inner.lock().set_request_header(name, value)
    }

    fn add_event_listener(&mut self, listener: RequestListener) {
        self.overlay.lock().listeners.push(Arc::clone(&listener));
        self.inner.lock().add_event_listener(listener);
    }

    fn send(&mut self, body: Option<Bytes>) -> Result<(), RequestStateError> {
        // A synthetic response completed this request without the wrapped
        // one ever being sent.
        if self.overlay.lock().synthetic.is_some() {
            return Err(RequestStateError::NotOpened);
        }
        if !self.simulation.is_enabled() {
            return self.inner.lock().send(body);
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RequestStateError::NoRuntime)?;

        let (label, generation) = {
            let mut overlay = self.overlay.lock();
            if overlay.pending {
                return Err(RequestStateError::AlreadySent);
            }
            match self.inner.lock().ready_state() {
                ReadyState::Opened => {}
                ReadyState::Loading => return Err(RequestStateError::AlreadySent),
                ReadyState::Unsent | ReadyState::Done => return Err(RequestStateError::NotOpened),
            }
            overlay.pending = true;
            (overlay.label.clone(), overlay.generation)
        };

        let call = self.simulation.begin(label);
        let inner = Arc::clone(&self.inner);
        let overlay = Arc::clone(&self.overlay);
        let simulation = Arc::clone(&self.simulation);

        runtime.spawn(async move {
            let elapsed_ms = simulation.wait(&call).await;

            if overlay.lock().generation != generation {
                simulation.complete(&call, "superseded by reopen", false);
                return;
            }

            match simulation.decide(&call, elapsed_ms) {
                Some(response) => {
                    let listeners = {
                        let mut overlay = overlay.lock();
                        if overlay.generation != generation {
                            return;
                        }
                        overlay.pending = false;
                        overlay.synthetic = Some(response.clone());
                        overlay.listeners.clone()
                    };
                    dispatch(&listeners, &RequestEvent::ReadyStateChange(ReadyState::Done));
                    dispatch(&listeners, &RequestEvent::Load(response));
                }
                None => {
                    let watch = Arc::new(CompletionWatch::new(call, Arc::clone(&simulation)));
                    {
                        let mut overlay = overlay.lock();
                        if overlay.generation != generation {
                            watch.finish("superseded by reopen", false);
                            return;
                        }
                        overlay.pending = false;
                        overlay.watch = Some(Arc::clone(&watch));
                    }

                    let listener: RequestListener = {
                        let watch = Arc::clone(&watch);
                        Arc::new(move |event: &RequestEvent| watch.observe(event))
                    };
                    let sent = {
                        let mut inner = inner.lock();
                        inner.add_event_listener(listener);
                        inner.send(body)
                    };
                    if let Err(error) = sent {
                        watch.finish(&format!("could not be sent: {error}"), true);
                    }
                }
            }
        });

        Ok(())
    }

    fn abort(&mut self) {
        self.inner.lock().abort();
    }

    fn ready_state(&self) -> ReadyState {
        {
            let overlay = self.overlay.lock();
            if overlay.synthetic.is_some() {
                return ReadyState::Done;
            }
            if overlay.pending {
                return ReadyState::Loading;
            }
        }
        self.inner.lock().ready_state()
    }

    fn response(&self) -> Option<HttpResponse> {
        if let Some(synthetic) = self.overlay.lock().synthetic.clone() {
            return Some(synthetic);
        }
        self.inner.lock().response()
    }
}
