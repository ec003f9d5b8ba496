//! Collaborator callbacks fed by the simulation.
//!
//! The core emits two kinds of events: free-form log messages and recorded
//! delays. Both collaborators are optional; every log message is also
//! emitted through `tracing`, so an absent sink changes nothing but the
//! audience.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::tracing_setup::CALL_EVENT_TARGET;

/// Receives human-readable simulation messages.
pub trait LogSink: Send + Sync {
    /// Called for call start, error injection and call completion.
    fn on_event(&self, message: &str, is_error: bool);
}

/// Receives each delay recorded by the metrics sink.
pub trait DelayObserver: Send + Sync {
    /// Called once per intercepted call with the observed delay.
    fn on_delay_recorded(&self, delay_ms: u64);
}

/// Log sink forwarding messages to `tracing` at info or warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn on_event(&self, message: &str, is_error: bool) {
        if is_error {
            tracing::warn!(target: CALL_EVENT_TARGET, "{message}");
        } else {
            tracing::info!(target: CALL_EVENT_TARGET, "{message}");
        }
    }
}

/// One message captured by [`MemoryLogSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub is_error: bool,
}

/// Log sink keeping every message in memory, oldest first.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of captured entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Number of captured entries flagged as errors.
    pub fn error_count(&self) -> usize {
        self.entries.lock().iter().filter(|e| e.is_error).count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemoryLogSink {
    fn on_event(&self, message: &str, is_error: bool) {
        self.entries.lock().push(LogEntry {
            timestamp: Utc::now(),
            message: message.to_string(),
            is_error,
        });
    }
}

/// Optional log sink plus the tracing mirror.
#[derive(Clone, Default)]
pub(crate) struct EventLog {
    sink: Option<Arc<dyn LogSink>>,
}

impl EventLog {
    pub(crate) fn new(sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, message: &str, is_error: bool) {
        tracing::debug!(is_error, "{message}");
        if let Some(sink) = &self.sink {
            sink.on_event(message, is_error);
        }
    }
}
