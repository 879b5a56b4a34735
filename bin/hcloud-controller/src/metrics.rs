//! Prometheus metrics and the health endpoint

use anyhow::Result;
use http_body_util::Full;
use hyper::{body::Bytes, server::conn::http1, service::service_fn, Method, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use hcloud_core::{ReconcileOutcome, RetryReason};
use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Reconciliation metrics sharing one registry
#[derive(Clone)]
pub struct ControllerMetrics {
    pub reconcile_total: CounterVec,
    pub rate_limited_total: Counter,
    pub reconcile_duration_seconds: Histogram,
    registry: Arc<Registry>,
}

impl ControllerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let reconcile_total = CounterVec::new(
            Opts::new("hcloud_reconcile_total", "Reconcile calls by outcome"),
            &["outcome"],
        )?;
        let rate_limited_total = Counter::new(
            "hcloud_rate_limited_total",
            "Reconcile calls held back by the Hetzner API rate limit",
        )?;
        let reconcile_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "hcloud_reconcile_duration_seconds",
            "Duration of reconcile calls in seconds",
        ))?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        Ok(Self {
            reconcile_total,
            rate_limited_total,
            reconcile_duration_seconds,
            registry,
        })
    }

    pub fn observe(&self, outcome: &ReconcileOutcome, elapsed: Duration) {
        let label = match outcome {
            ReconcileOutcome::Done => "done",
            ReconcileOutcome::RetryAfter { reason, .. } => {
                if *reason == RetryReason::RateLimited {
                    self.rate_limited_total.inc();
                }
                "retry"
            }
            ReconcileOutcome::Fatal(_) => "fatal",
        };
        self.reconcile_total.with_label_values(&[label]).inc();
        self.reconcile_duration_seconds.observe(elapsed.as_secs_f64());
    }

    /// Text exposition of every registered metric
    pub fn gather(&self) -> Result<String> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn respond(metrics: &ControllerMetrics, method: &Method, path: &str) -> Response<Full<Bytes>> {
    let route = if *method == Method::GET { path } else { "" };
    let (status, body) = match route {
        "/metrics" => match metrics.gather() {
            Ok(text) => (StatusCode::OK, text),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to gather metrics: {}\n", e)),
        },
        "/healthz" => (StatusCode::OK, "OK\n".to_string()),
        _ => (StatusCode::NOT_FOUND, "Not Found\n".to_string()),
    };
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if route == "/metrics" {
        if let Ok(value) = "text/plain; version=0.0.4".parse() {
            response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
        }
    }
    response
}

/// Serve `/metrics` and `/healthz` until the listener fails
pub async fn serve(addr: SocketAddr, metrics: ControllerMetrics) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = respond(&metrics, req.method(), req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving metrics connection from {}: {}", peer_addr, e);
            }
        });
    }
}
