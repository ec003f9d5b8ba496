//! CLI command implementations

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use clap::{Args, Subcommand, ValueEnum};
use netlag_core::{
    ConditionPreset, ConfigError, DelayHistory, DeterministicRng, Distribution, HttpRequest,
    InterceptionContext, Method, RandomSource, RequestEvent, RequestListener, ReqwestTransport,
    SimulationConfig, ThreadRandom, TracingLogSink, TransportRegistry, TransportRequestFactory,
    pick_delay,
};
use tokio::sync::mpsc;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Draw delays from a distribution and summarize them
    Sample {
        #[command(flatten)]
        condition: ConditionArgs,
        /// Number of delays to draw
        #[arg(short, long, default_value = "1000")]
        count: usize,
        /// Number of histogram buckets
        #[arg(long, default_value = "10")]
        buckets: usize,
    },
    /// Send requests to a URL through the interception layer
    Probe {
        /// Absolute URL to request
        url: String,
        #[command(flatten)]
        condition: ConditionArgs,
        /// Number of requests to send
        #[arg(short, long, default_value = "10")]
        count: usize,
        /// Request surface to exercise
        #[arg(long, value_enum, default_value = "fetch")]
        mode: ProbeMode,
        /// Per-request timeout of the real transport
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
    /// List the built-in network condition presets
    Presets,
    /// Run a local endpoint to probe against
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind to
        #[arg(short, long, default_value = "3900")]
        port: u16,
    },
}

/// Which request surface `probe` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeMode {
    /// Async fetch-style transport
    Fetch,
    /// Event-driven request objects
    Request,
    /// Alternate between both
    Both,
}

/// Simulation settings shared by `sample` and `probe`.
///
/// Starts from the preset if given, otherwise from `NETLAG_*` environment
/// overrides, then applies individual flags.
#[derive(Args, Debug, Clone)]
pub struct ConditionArgs {
    /// Start from a named condition
    #[arg(long, value_enum)]
    preset: Option<ConditionPreset>,
    /// Base latency in milliseconds
    #[arg(long)]
    base: Option<f64>,
    /// Jitter in milliseconds
    #[arg(long)]
    jitter: Option<f64>,
    /// Jitter distribution
    #[arg(long, value_enum)]
    distribution: Option<Distribution>,
    /// Error injection rate in percent
    #[arg(long)]
    error_rate: Option<f64>,
    /// Status code of injected errors
    #[arg(long)]
    status: Option<u16>,
    /// Status text of injected errors
    #[arg(long)]
    status_text: Option<String>,
    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

impl ConditionArgs {
    fn resolve(&self) -> Result<SimulationConfig, ConfigError> {
        let mut config = match self.preset {
            Some(preset) => preset.config(),
            None => SimulationConfig::from_env(),
        };

        if let Some(base) = self.base {
            config.base_latency_ms = base;
        }
        if let Some(jitter) = self.jitter {
            config.jitter_ms = jitter;
        }
        if let Some(distribution) = self.distribution {
            config.distribution = distribution;
        }
        if let Some(rate) = self.error_rate {
            config.error_rate_percent = rate;
        }
        if let Some(status) = self.status {
            config.error_status_code = status;
        }
        if let Some(text) = &self.status_text {
            config.error_status_text = text.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Sample {
            condition,
            count,
            buckets,
        } => sample_delays(&condition, count, buckets),
        Commands::Probe {
            url,
            condition,
            count,
            mode,
            timeout_secs,
        } => probe_url(&url, &condition, count, mode, Duration::from_secs(timeout_secs)).await,
        Commands::Presets => {
            list_presets();
            Ok(())
        }
        Commands::Serve { host, port } => serve_endpoint(&host, port).await,
    }
}

/// Draw delays and print their summary and histogram
///
/// # Errors
/// - `ConfigError` - Condition flags produce an invalid configuration
pub fn sample_delays(condition: &ConditionArgs, count: usize, buckets: usize) -> anyhow::Result<()> {
    let config = condition.resolve()?;
    let mut rng: Box<dyn RandomSource> = match condition.seed {
        Some(seed) => Box::new(DeterministicRng::from_seed(seed)),
        None => Box::new(ThreadRandom),
    };

    let samples: Vec<u64> = (0..count).map(|_| pick_delay(&config, rng.as_mut())).collect();
    let mut history = DelayHistory::new(count);
    for &sample in &samples {
        history.push(sample);
    }

    println!(
        "{} distribution, base {}ms, jitter {}ms",
        config.distribution, config.base_latency_ms, config.jitter_ms
    );
    let Some(stats) = history.stats() else {
        println!("No samples drawn");
        return Ok(());
    };

    let variance = samples
        .iter()
        .map(|&s| (s as f64 - stats.mean_ms).powi(2))
        .sum::<f64>()
        / stats.count as f64;
    println!(
        "  count {}  min {}ms  max {}ms  mean {:.1}ms  std dev {:.1}ms",
        stats.count,
        stats.min_ms,
        stats.max_ms,
        stats.mean_ms,
        variance.sqrt()
    );

    for (lower, upper, hits) in histogram(&samples, stats.min_ms, stats.max_ms, buckets) {
        let width = hits * 50 / stats.count.max(1);
        println!("  {lower:>6}-{upper:<6} {hits:>6} {}", "#".repeat(width));
    }

    Ok(())
}

fn histogram(samples: &[u64], min: u64, max: u64, buckets: usize) -> Vec<(u64, u64, usize)> {
    let buckets = buckets.max(1) as u64;
    let width = ((max - min) / buckets).max(1);
    let mut counts = vec![0usize; buckets as usize];
    for &sample in samples {
        let index = ((sample - min) / width).min(buckets - 1) as usize;
        counts[index] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, hits)| {
            let lower = min + i as u64 * width;
            let upper = if i as u64 == buckets - 1 {
                max
            } else {
                lower + width - 1
            };
            (lower, upper, hits)
        })
        .collect()
}

/// Send `count` requests to `url` with interception enabled
///
/// # Errors
/// - `ConfigError` - Condition flags produce an invalid configuration
/// - `TransportError::Client` - HTTP client could not be created
/// - `RequestStateError` - `url` is not an absolute URL
pub async fn probe_url(
    url: &str,
    condition: &ConditionArgs,
    count: usize,
    mode: ProbeMode,
    timeout: Duration,
) -> anyhow::Result<()> {
    let config = condition.resolve()?;
    let transport = Arc::new(ReqwestTransport::new(timeout)?);
    let registry = TransportRegistry::new(
        transport.clone(),
        Arc::new(TransportRequestFactory::new(transport)),
    );

    let mut builder = InterceptionContext::builder(registry)
        .config(config.clone())
        .log_sink(Arc::new(TracingLogSink))
        .history_capacity(count.max(1));
    if let Some(seed) = condition.seed {
        builder = builder.seed(seed);
    }
    let context = builder.build();
    context.enable();

    println!(
        "Probing {url} {count} times ({} {}ms ±{}ms, {}% errors)",
        config.distribution, config.base_latency_ms, config.jitter_ms, config.error_rate_percent
    );

    for i in 0..count {
        let use_request_object = match mode {
            ProbeMode::Fetch => false,
            ProbeMode::Request => true,
            ProbeMode::Both => i % 2 == 1,
        };

        let started = Instant::now();
        let outcome = if use_request_object {
            probe_with_request_object(&context, url).await?
        } else {
            match context.registry().fetch(HttpRequest::get(url)).await {
                Ok(response) => format!("{} {}", response.status_code, response.status_text),
                Err(error) => format!("failed: {error}"),
            }
        };

        let surface = if use_request_object { "request" } else { "fetch" };
        println!(
            "  #{:<3} {surface:<7} {outcome} ({}ms)",
            i + 1,
            started.elapsed().as_millis()
        );
    }

    if let Some(stats) = context.metrics().stats() {
        println!(
            "Simulated delay: min {}ms  max {}ms  mean {:.1}ms over {} calls",
            stats.min_ms, stats.max_ms, stats.mean_ms, stats.count
        );
    }

    context.disable();
    Ok(())
}

async fn probe_with_request_object(
    context: &InterceptionContext,
    url: &str,
) -> anyhow::Result<String> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: RequestListener = Arc::new(move |event: &RequestEvent| {
        let _ = tx.send(event.clone());
    });

    let mut request = context.registry().create_request();
    request.add_event_listener(listener);
    request.open(Method::GET, url)?;
    request.send(None)?;

    while let Some(event) = rx.recv().await {
        match event {
            RequestEvent::ReadyStateChange(_) => continue,
            RequestEvent::Load(response) => {
                return Ok(format!("{} {}", response.status_code, response.status_text));
            }
            RequestEvent::Error(error) => return Ok(format!("failed: {error}")),
            RequestEvent::Abort => return Ok("aborted".to_string()),
        }
    }

    anyhow::bail!("request object dropped its listeners before finishing")
}

/// Print the built-in condition presets
pub fn list_presets() {
    for preset in ConditionPreset::ALL {
        let config = preset.config();
        println!(
            "{:<8} {:>4}ms ±{:<4}ms {:<8} {:>4}% -> {} {}  ({})",
            preset.to_string(),
            config.base_latency_ms,
            config.jitter_ms,
            config.distribution.to_string(),
            config.error_rate_percent,
            config.error_status_code,
            config.error_status_text,
            preset.description()
        );
    }
}

/// Serve `/ping`, `/echo` and `/status/{code}` on `host:port`
///
/// # Errors
/// - `std::io::Error` - Address cannot be bound or the server fails
pub async fn serve_endpoint(host: &str, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/echo", post(|body: Bytes| async move { body }))
        .route("/status/{code}", get(respond_with_status));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Serving probe endpoint on http://{addr}");
    println!("Serving on http://{addr} (GET /ping, POST /echo, GET /status/{{code}})");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn respond_with_status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}
