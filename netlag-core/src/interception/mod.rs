//! Enable/disable control over transport interception.
//!
//! An [`InterceptionContext`] is built once at start-up around the
//! application's [`TransportRegistry`]. Enabling it installs simulating
//! adapters for both request surfaces; disabling it restores the original
//! transports exactly. Each adapter reads the enabled flag once per call, so
//! toggling never affects a call that is already waiting out its delay.

mod fetch;
mod request;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub use fetch::SimulatedTransport;
use parking_lot::Mutex;
pub use request::{SimulatedRequest, SimulatedRequestFactory};
use uuid::Uuid;

use crate::config::{ConfigProvider, SimulationConfig};
use crate::events::{DelayObserver, EventLog, LogSink};
use crate::fault::{should_inject_error, synthesize_error_response};
use crate::metrics::{DEFAULT_HISTORY_CAPACITY, MetricsSink};
use crate::network::{
    HttpResponse, HttpTransport, Interceptor, RequestFactory, RestoreHandle, TransportRegistry,
};
use crate::random::{DeterministicRng, RandomSource, SharedRandom, ThreadRandom, shared_random};
use crate::sampler::pick_delay;

/// State shared by the context and every adapter it installs.
pub(crate) struct Simulation {
    enabled: AtomicBool,
    config: Arc<dyn ConfigProvider>,
    rng: SharedRandom,
    log: EventLog,
    metrics: Arc<MetricsSink>,
}

/// A call that has been assigned a delay but has not waited it out yet.
pub(crate) struct PendingCall {
    id: Uuid,
    label: String,
    config: SimulationConfig,
    delay: Duration,
}

impl Simulation {
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Snapshots the configuration and samples this call's delay.
    pub(crate) fn begin(&self, label: String) -> PendingCall {
        let config = self.config.snapshot();
        let delay_ms = pick_delay(&config, &mut *self.rng.lock());
        let call = PendingCall {
            id: Uuid::new_v4(),
            label,
            config,
            delay: Duration::from_millis(delay_ms),
        };

        tracing::debug!(call_id = %call.id, delay_ms, "Intercepted call");
        self.log
            .emit(&format!("{} delayed by {delay_ms}ms", call.label), false);
        call
    }

    /// Waits out the delay and records how long it actually took.
    pub(crate) async fn wait(&self, call: &PendingCall) -> u64 {
        let started = tokio::time::Instant::now();
        tokio::time::sleep(call.delay).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record(elapsed_ms);
        elapsed_ms
    }

    /// Rolls for an injected error. Returns the synthetic response on failure.
    pub(crate) fn decide(&self, call: &PendingCall, elapsed_ms: u64) -> Option<HttpResponse> {
        let inject = should_inject_error(call.config.error_rate_percent, &mut *self.rng.lock());
        if !inject {
            return None;
        }

        let status_code = call.config.error_status_code;
        let status_text = &call.config.error_status_text;
        tracing::debug!(call_id = %call.id, status_code, "Injecting simulated error");
        self.log.emit(
            &format!(
                "{} failed with simulated {status_code} {status_text} after {elapsed_ms}ms",
                call.label
            ),
            true,
        );
        Some(synthesize_error_response(status_code, status_text))
    }

    /// [`Self::wait`] followed by [`Self::decide`].
    pub(crate) async fn elapse(&self, call: &PendingCall) -> Option<HttpResponse> {
        let elapsed_ms = self.wait(call).await;
        self.decide(call, elapsed_ms)
    }

    pub(crate) fn complete(&self, call: &PendingCall, outcome: &str, is_error: bool) {
        tracing::debug!(call_id = %call.id, is_error, "Intercepted call finished");
        self.log.emit(&format!("{} {outcome}", call.label), is_error);
    }
}

struct SimulationInterceptor {
    simulation: Arc<Simulation>,
}

impl Interceptor for SimulationInterceptor {
    fn intercept_transport(&self, original: Arc<dyn HttpTransport>) -> Arc<dyn HttpTransport> {
        Arc::new(SimulatedTransport::new(original, Arc::clone(&self.simulation)))
    }

    fn intercept_requests(&self, original: Arc<dyn RequestFactory>) -> Arc<dyn RequestFactory> {
        Arc::new(SimulatedRequestFactory::new(
            original,
            Arc::clone(&self.simulation),
        ))
    }
}

/// Toggle installing and removing the simulating adapters.
///
/// Starts disabled. Dropping the context restores the original transports
/// if it is still enabled.
pub struct InterceptionContext {
    simulation: Arc<Simulation>,
    registry: TransportRegistry,
    restore: Mutex<Option<RestoreHandle>>,
}

impl InterceptionContext {
    /// Returns a builder bound to `registry`.
    pub fn builder(registry: TransportRegistry) -> InterceptionContextBuilder {
        InterceptionContextBuilder::new(registry)
    }

    /// Installs the simulating adapters. No-op besides re-asserting state
    /// when already enabled.
    pub fn enable(&self) {
        let mut restore = self.restore.lock();
        if restore.is_none() {
            *restore = Some(self.registry.install(&SimulationInterceptor {
                simulation: Arc::clone(&self.simulation),
            }));
            tracing::info!("Network simulation enabled");
        }
        self.simulation.enabled.store(true, Ordering::SeqCst);
    }

    /// Restores the original transports. No-op besides re-asserting state
    /// when already disabled.
    pub fn disable(&self) {
        let mut restore = self.restore.lock();
        self.simulation.enabled.store(false, Ordering::SeqCst);
        if let Some(handle) = restore.take() {
            handle.restore();
            tracing::info!("Network simulation disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.simulation.is_enabled()
    }

    /// Registry the adapters are installed into.
    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Delay history fed by both adapters.
    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.simulation.metrics
    }

    /// Configuration the next intercepted call will see.
    pub fn current_config(&self) -> SimulationConfig {
        self.simulation.config.snapshot()
    }
}

impl Drop for InterceptionContext {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Builder for [`InterceptionContext`].
///
/// Defaults: [`SimulationConfig::default`], the thread-local random source,
/// no log sink, no delay observer and a history of
/// [`DEFAULT_HISTORY_CAPACITY`] entries.
pub struct InterceptionContextBuilder {
    registry: TransportRegistry,
    config: Arc<dyn ConfigProvider>,
    rng: SharedRandom,
    log_sink: Option<Arc<dyn LogSink>>,
    delay_observer: Option<Arc<dyn DelayObserver>>,
    history_capacity: usize,
}

impl InterceptionContextBuilder {
    fn new(registry: TransportRegistry) -> Self {
        Self {
            registry,
            config: Arc::new(SimulationConfig::default()),
            rng: shared_random(ThreadRandom),
            log_sink: None,
            delay_observer: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    /// Reads configuration from `provider` on every call.
    pub fn config_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.config = provider;
        self
    }

    /// Uses a fixed configuration.
    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Draws delays and error decisions from `source`.
    pub fn random_source<R: RandomSource + 'static>(mut self, source: R) -> Self {
        self.rng = shared_random(source);
        self
    }

    /// Draws from a ChaCha8 generator seeded with `seed`.
    pub fn seed(self, seed: u64) -> Self {
        self.random_source(DeterministicRng::from_seed(seed))
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn delay_observer(mut self, observer: Arc<dyn DelayObserver>) -> Self {
        self.delay_observer = Some(observer);
        self
    }

    /// Sets how many delays the metrics history keeps.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Creates the context in the disabled state.
    pub fn build(self) -> InterceptionContext {
        InterceptionContext {
            simulation: Arc::new(Simulation {
                enabled: AtomicBool::new(false),
                config: self.config,
                rng: self.rng,
                log: EventLog::new(self.log_sink),
                metrics: Arc::new(MetricsSink::new(self.history_capacity, self.delay_observer)),
            }),
            registry: self.registry,
            restore: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{StaticTransport, TransportRequestFactory};

    fn context() -> (InterceptionContext, Arc<dyn HttpTransport>, Arc<dyn RequestFactory>) {
        let transport: Arc<dyn HttpTransport> = Arc::new(StaticTransport::new());
        let requests: Arc<dyn RequestFactory> =
            Arc::new(TransportRequestFactory::new(Arc::clone(&transport)));
        let registry = TransportRegistry::new(Arc::clone(&transport), Arc::clone(&requests));
        let context = InterceptionContext::builder(registry).seed(1).build();
        (context, transport, requests)
    }

    #[test]
    fn test_starts_disabled_with_originals_installed() {
        let (context, transport, _) = context();
        assert!(!context.is_enabled());
        assert!(Arc::ptr_eq(&context.registry().transport(), &transport));
    }

    #[test]
    fn test_enable_installs_adapters() {
        let (context, transport, requests) = context();
        context.enable();

        assert!(context.is_enabled());
        assert!(!Arc::ptr_eq(&context.registry().transport(), &transport));
        assert!(!Arc::ptr_eq(&context.registry().request_factory(), &requests));
    }

    #[test]
    fn test_disable_restores_originals_verbatim() {
        let (context, transport, requests) = context();
        context.enable();
        context.disable();

        assert!(!context.is_enabled());
        assert!(Arc::ptr_eq(&context.registry().transport(), &transport));
        assert!(Arc::ptr_eq(&context.registry().request_factory(), &requests));
    }

    #[test]
    fn test_enable_twice_does_not_wrap_twice() {
        let (context, transport, _) = context();
        context.enable();
        let installed = context.registry().transport();
        context.enable();

        assert!(Arc::ptr_eq(&context.registry().transport(), &installed));
        context.disable();
        assert!(Arc::ptr_eq(&context.registry().transport(), &transport));
    }

    #[test]
    fn test_disable_when_disabled_is_noop() {
        let (context, transport, _) = context();
        context.disable();
        context.disable();

        assert!(!context.is_enabled());
        assert!(Arc::ptr_eq(&context.registry().transport(), &transport));
    }

    #[test]
    fn test_drop_restores_originals() {
        let (context, transport, _) = context();
        let registry = context.registry().clone();
        context.enable();
        drop(context);

        assert!(Arc::ptr_eq(&registry.transport(), &transport));
    }

    #[test]
    fn test_builder_applies_history_capacity_and_config() {
        let registry = TransportRegistry::new(
            Arc::new(StaticTransport::new()),
            Arc::new(TransportRequestFactory::new(Arc::new(StaticTransport::new()))),
        );
        let config = SimulationConfig::passthrough();
        let context = InterceptionContext::builder(registry)
            .config(config.clone())
            .history_capacity(5)
            .build();

        assert_eq!(context.metrics().capacity(), 5);
        assert_eq!(context.current_config(), config);
    }
}
