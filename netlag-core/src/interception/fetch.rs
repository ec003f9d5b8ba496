//! Simulating wrapper for the fetch-style transport.

use std::sync::Arc;

use async_trait::async_trait;

use super::Simulation;
use crate::network::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Delays each call and, at the configured rate, answers with a synthetic
/// error instead of reaching the wrapped transport.
///
/// While the simulation is disabled every call passes straight through.
pub struct SimulatedTransport {
    original: Arc<dyn HttpTransport>,
    simulation: Arc<Simulation>,
}

impl SimulatedTransport {
    pub(crate) fn new(original: Arc<dyn HttpTransport>, simulation: Arc<Simulation>) -> Self {
        Self {
            original,
            simulation,
        }
    }
}

#[async_trait]
impl HttpTransport for SimulatedTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if !self.simulation.is_enabled() {
            return self.original.fetch(request).await;
        }

        let call = self
            .simulation
            .begin(format!("{} {}", request.method, request.url));

        if let Some(synthetic) = self.simulation.elapse(&call).await {
            return Ok(synthetic);
        }

        let result = self.original.fetch(request).await;
        match &result {
            Ok(response) => self.simulation.complete(
                &call,
                &format!("completed with {}", response.status_code),
                false,
            ),
            Err(error) => self
                .simulation
                .complete(&call, &format!("failed: {error}"), true),
        }
        result
    }
}
