//! Round trips through a real HTTP server with interception enabled.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use netlag_core::{
    Distribution, HttpRequest, InterceptionContext, ReqwestTransport, SimulationConfig,
    TransportError, TransportRegistry, TransportRequestFactory,
};
use tokio::net::TcpListener;

async fn spawn_server() -> String {
    let app = Router::new().route("/ping", get(|| async { "pong" }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn context(config: SimulationConfig) -> InterceptionContext {
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    let registry = TransportRegistry::new(
        transport.clone(),
        Arc::new(TransportRequestFactory::new(transport)),
    );
    InterceptionContext::builder(registry)
        .config(config)
        .seed(11)
        .build()
}

#[tokio::test]
async fn test_intercepted_fetch_returns_server_response() {
    let base = spawn_server().await;
    let config = SimulationConfig::default().with_latency(30.0, 0.0, Distribution::Uniform);
    let context = context(config);
    context.enable();

    let started = std::time::Instant::now();
    let response = context
        .registry()
        .fetch(HttpRequest::get(format!("{base}/ping")))
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.text().unwrap(), "pong");
    assert!(started.elapsed() >= Duration::from_millis(30));

    let recorded = context.metrics().history();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0] >= 30);
}

#[tokio::test]
async fn test_unknown_route_is_not_mistaken_for_injected_error() {
    let base = spawn_server().await;
    let context = context(SimulationConfig::passthrough());
    context.enable();

    let response = context
        .registry()
        .fetch(HttpRequest::get(format!("{base}/missing")))
        .await
        .unwrap();

    assert_eq!(response.status_code, 404);
    assert!(!response.text().unwrap_or_default().contains("Simulated"));
}

#[tokio::test]
async fn test_connection_failure_propagates_through_adapter() {
    // Bind then drop to obtain a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let context = context(SimulationConfig::passthrough());
    context.enable();

    let result = context
        .registry()
        .fetch(HttpRequest::get(format!("http://{addr}/ping")))
        .await;

    assert!(matches!(result, Err(TransportError::Connect { .. })));
}
