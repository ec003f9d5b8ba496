//! Integration tests for the fetch-style interception path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use netlag_core::{
    DelayObserver, Distribution, HttpRequest, HttpResponse, HttpTransport, InterceptionContext,
    MemoryLogSink, SharedConfig, SimulationConfig, StaticTransport, TransportError,
    TransportRegistry, TransportRequestFactory,
};
use tokio::time::Instant;

const URL: &str = "http://api.test/items";

struct Harness {
    context: InterceptionContext,
    transport: Arc<StaticTransport>,
    log: Arc<MemoryLogSink>,
}

fn harness(config: SimulationConfig) -> Harness {
    harness_with_provider(Arc::new(SharedConfig::new(config).unwrap()))
}

fn harness_with_provider(provider: Arc<SharedConfig>) -> Harness {
    let transport = Arc::new(
        StaticTransport::new().with_response(URL, HttpResponse::new(200, r#"{"items":[]}"#)),
    );
    let registry = TransportRegistry::new(
        transport.clone(),
        Arc::new(TransportRequestFactory::new(transport.clone())),
    );
    let log = Arc::new(MemoryLogSink::new());
    let context = InterceptionContext::builder(registry)
        .config_provider(provider)
        .seed(42)
        .log_sink(log.clone())
        .build();

    Harness {
        context,
        transport,
        log,
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_error_rate_returns_synthetic_response_without_network() {
    let config = SimulationConfig::passthrough().with_errors(100.0, 503, "Service Unavailable");
    let h = harness(config);
    h.context.enable();

    let started = Instant::now();
    let response = h
        .context
        .registry()
        .fetch(HttpRequest::get(URL))
        .await
        .unwrap();

    assert_eq!(response.status_code, 503);
    assert_eq!(response.status_text, "Service Unavailable");
    assert_eq!(
        response.text().unwrap(),
        r#"{"message":"Simulated 503 Service Unavailable"}"#
    );
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(h.log.error_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_error_rate_always_returns_original_response() {
    let config = SimulationConfig::default()
        .with_latency(20.0, 10.0, Distribution::Uniform)
        .with_errors(0.0, 500, "Internal Server Error");
    let h = harness(config);
    h.context.enable();

    for _ in 0..25 {
        let response = h
            .context
            .registry()
            .fetch(HttpRequest::get(URL))
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.as_ref(), br#"{"items":[]}"#);
    }
    assert_eq!(h.transport.request_count(), 25);
    assert_eq!(h.context.metrics().history().len(), 25);
}

#[tokio::test(start_paused = true)]
async fn test_enabled_call_waits_for_sampled_delay() {
    let config = SimulationConfig::default().with_latency(250.0, 0.0, Distribution::Normal);
    let h = harness(config);
    h.context.enable();

    let started = Instant::now();
    h.context
        .registry()
        .fetch(HttpRequest::get(URL))
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_millis(250));
    assert_eq!(h.context.metrics().history(), vec![250]);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_adapter_passes_through_without_delay() {
    let config = SimulationConfig::default()
        .with_latency(500.0, 0.0, Distribution::Uniform)
        .with_errors(100.0, 500, "Internal Server Error");
    let h = harness(config);
    h.context.enable();
    let adapter: Arc<dyn HttpTransport> = h.context.registry().transport();
    h.context.disable();

    let started = Instant::now();
    let response = adapter.fetch(HttpRequest::get(URL)).await.unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(h.context.metrics().history().is_empty());
    assert!(h.log.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_propagates_unchanged() {
    let error = TransportError::Connect {
        url: "http://down.test/".to_string(),
        reason: "connection refused".to_string(),
    };
    let h = harness(SimulationConfig::passthrough());
    h.transport.add_failure("http://down.test/", error.clone());
    h.context.enable();

    let result = h
        .context
        .registry()
        .fetch(HttpRequest::get("http://down.test/"))
        .await;

    assert_eq!(result, Err(error));
    assert_eq!(h.log.error_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabling_mid_delay_does_not_cancel_call() {
    let config = SimulationConfig::default().with_latency(100.0, 0.0, Distribution::Uniform);
    let h = harness(config);
    h.context.enable();
    let registry = h.context.registry().clone();

    let call = tokio::spawn(async move { registry.fetch(HttpRequest::get(URL)).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.context.disable();

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(h.context.metrics().history(), vec![100]);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_is_read_fresh_for_each_call() {
    let provider = Arc::new(SharedConfig::new(SimulationConfig::passthrough()).unwrap());
    let h = harness_with_provider(provider.clone());
    h.context.enable();

    let first = h.context.registry().fetch(HttpRequest::get(URL)).await.unwrap();
    provider
        .modify(|config| {
            config.error_rate_percent = 100.0;
            config.error_status_code = 429;
            config.error_status_text = "Too Many Requests".to_string();
        })
        .unwrap();
    let second = h.context.registry().fetch(HttpRequest::get(URL)).await.unwrap();

    assert_eq!(first.status_code, 200);
    assert_eq!(second.status_code, 429);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_record_as_their_delays_elapse() {
    struct Order(parking_lot::Mutex<Vec<u64>>);
    impl DelayObserver for Order {
        fn on_delay_recorded(&self, delay_ms: u64) {
            self.0.lock().push(delay_ms);
        }
    }

    let provider = Arc::new(
        SharedConfig::new(SimulationConfig::default().with_latency(300.0, 0.0, Distribution::Uniform))
            .unwrap(),
    );
    let transport = Arc::new(StaticTransport::new());
    let registry = TransportRegistry::new(
        transport.clone(),
        Arc::new(TransportRequestFactory::new(transport.clone())),
    );
    let order = Arc::new(Order(parking_lot::Mutex::new(Vec::new())));
    let context = InterceptionContext::builder(registry.clone())
        .config_provider(provider.clone())
        .delay_observer(order.clone())
        .build();
    context.enable();

    let slow = tokio::spawn({
        let registry = registry.clone();
        async move { registry.fetch(HttpRequest::get(URL)).await }
    });
    tokio::task::yield_now().await;
    provider
        .modify(|config| config.base_latency_ms = 50.0)
        .unwrap();
    let fast = registry.fetch(HttpRequest::get(URL)).await;

    slow.await.unwrap().unwrap();
    fast.unwrap();
    assert_eq!(*order.0.lock(), vec![50, 300]);
}

#[tokio::test(start_paused = true)]
async fn test_log_events_cover_start_and_completion() {
    let h = harness(SimulationConfig::default().with_latency(5.0, 0.0, Distribution::Uniform));
    h.context.enable();

    h.context.registry().fetch(HttpRequest::get(URL)).await.unwrap();

    let messages: Vec<String> = h.log.entries().into_iter().map(|e| e.message).collect();
    assert_eq!(
        messages,
        vec![
            format!("GET {URL} delayed by 5ms"),
            format!("GET {URL} completed with 200"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_injection_rate_over_many_calls() {
    let config = SimulationConfig::passthrough().with_errors(25.0, 500, "Internal Server Error");
    let h = harness(config);
    h.context.enable();

    let calls = 2_000;
    let failures = Arc::new(AtomicUsize::new(0));
    for _ in 0..calls {
        let response = h.context.registry().fetch(HttpRequest::get(URL)).await.unwrap();
        if response.status_code == 500 {
            failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    let fraction = failures.load(Ordering::SeqCst) as f64 / calls as f64;
    assert!((fraction - 0.25).abs() < 0.05, "fraction {fraction}");
    assert_eq!(
        h.transport.request_count(),
        calls - failures.load(Ordering::SeqCst)
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_wait_independently() {
    let config = SimulationConfig::default().with_latency(200.0, 0.0, Distribution::Uniform);
    let h = harness(config);
    h.context.enable();

    let started = Instant::now();
    let calls = (0..8).map(|_| h.context.registry().fetch(HttpRequest::get(URL)));
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|resp| resp.status_code == 200)));
    assert_eq!(started.elapsed(), Duration::from_millis(200));
    assert_eq!(h.context.metrics().history(), vec![200; 8]);
}
