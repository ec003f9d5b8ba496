//! Netlag Core - Latency and error injection for outbound HTTP
//!
//! This crate intercepts the two request surfaces an application uses (an
//! async fetch-style transport and an event-driven request object) and
//! subjects every call to a sampled delay and, at a configured rate, a
//! synthetic error response. Enabling and disabling the simulation swaps the
//! transports in a [`TransportRegistry`] without touching application code.

pub mod config;
pub mod events;
pub mod fault;
pub mod interception;
pub mod metrics;
pub mod network;
pub mod random;
pub mod sampler;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{
    ConditionPreset, ConfigError, ConfigProvider, Distribution, SharedConfig, SimulationConfig,
};
pub use events::{DelayObserver, LogEntry, LogSink, MemoryLogSink, TracingLogSink};
pub use fault::{should_inject_error, synthesize_error_response};
pub use interception::{
    InterceptionContext, InterceptionContextBuilder, SimulatedRequest, SimulatedRequestFactory,
    SimulatedTransport,
};
pub use metrics::{DEFAULT_HISTORY_CAPACITY, DelayHistory, DelayStats, MetricsSink};
pub use network::{
    HttpRequest, HttpResponse, HttpTransport, Interceptor, Method, ReadyState, RequestEvent,
    RequestFactory, RequestListener, RequestObject, RequestStateError, ReqwestTransport, RestoreHandle,
    StaticTransport, TransportError, TransportRegistry, TransportRequestFactory,
};
pub use random::{
    DeterministicRng, RandomSource, SequenceRandom, SharedRandom, ThreadRandom, shared_random,
};
pub use sampler::{delay_duration, pick_delay};

/// Errors that can bubble up from any netlag subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NetlagError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Request error: {0}")]
    Request(#[from] RequestStateError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetlagError {
    /// Returns a short message suitable for display in a log pane.
    pub fn user_message(&self) -> String {
        match self {
            NetlagError::Transport(e) => match e {
                TransportError::Timeout { url } => format!("Request to {url} timed out"),
                TransportError::Connect { url, .. } => format!("Could not connect to {url}"),
                _ => "Network request failed".to_string(),
            },
            NetlagError::Request(e) => format!("Request misuse: {e}"),
            NetlagError::Configuration(e) => format!("Invalid simulation settings: {e}"),
            NetlagError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            NetlagError::Configuration(_) | NetlagError::Request(RequestStateError::InvalidUrl { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, NetlagError>;
