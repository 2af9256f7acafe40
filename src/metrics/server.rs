//! Prometheus metrics HTTP server.
//!
//! Serves metrics and backend status on a configurable HTTP endpoint.

use crate::balancer::BackendStatus;
use crate::metrics::MetricsCollector;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Source of live backend status, polled on each scrape.
pub type StatusSource = Arc<dyn Fn() -> Vec<BackendStatus> + Send + Sync>;

/// Prometheus metrics HTTP server.
pub struct MetricsServer {
    /// Address to bind.
    address: SocketAddr,
    /// Path for metrics endpoint.
    path: String,
    /// Metrics collector.
    collector: MetricsCollector,
    /// Live backend status, refreshed into gauges on scrape.
    status: StatusSource,
}

impl MetricsServer {
    /// Create a new metrics server.
    pub fn new(
        address: SocketAddr,
        path: String,
        collector: MetricsCollector,
        status: StatusSource,
    ) -> Self {
        Self {
            address,
            path,
            collector,
            status,
        }
    }

    /// Run the metrics server.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let listener = match TcpListener::bind(self.address).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, address = %self.address, "failed to bind metrics server");
                return;
            }
        };

        info!(address = %self.address, path = %self.path, "metrics server started");

        let collector = Arc::new(self.collector);
        let path = Arc::new(self.path);
        let status = self.status;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let collector = Arc::clone(&collector);
                            let path = Arc::clone(&path);
                            let status = Arc::clone(&status);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let collector = Arc::clone(&collector);
                                    let path = Arc::clone(&path);
                                    let status = Arc::clone(&status);
                                    async move {
                                        handle_request(req, &collector, &path, &status).await
                                    }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, "metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }
    }
}

/// Handle an incoming metrics request.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    collector: &MetricsCollector,
    metrics_path: &str,
    status: &StatusSource,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let method = req.method();

    debug!(path = %path, method = %method, "metrics request");

    // Only handle GET requests
    if method != Method::GET {
        return Ok(Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Full::new(Bytes::from("Method not allowed\n")))
            .unwrap());
    }

    if path == metrics_path {
        // Gauges reflect the moment of the scrape
        for backend in (status)() {
            collector.set_backend_health(&backend.address, backend.healthy);
            collector.set_in_flight(&backend.address, backend.active_load);
        }

        // Encode metrics in Prometheus text format
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, collector.registry()) {
            error!(error = %e, "failed to encode metrics");
            return Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from("Failed to encode metrics\n")))
                .unwrap());
        }

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(buffer)))
            .unwrap())
    } else if path == "/health" || path == "/healthz" {
        // Health check endpoint
        Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("OK\n")))
            .unwrap())
    } else if path == "/backends" {
        // Live backend status table
        let body = render_backends(&(status)());
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from(body)))
            .unwrap())
    } else if path == "/" {
        // Root path - show simple info
        let body = format!(
            "rudder metrics server\n\nEndpoints:\n  {} - Prometheus metrics\n  /backends - Backend status\n  /health - Health check\n",
            metrics_path
        );
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from(body)))
            .unwrap())
    } else {
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not found\n")))
            .unwrap())
    }
}

/// Render backend status as a plain-text table.
fn render_backends(statuses: &[BackendStatus]) -> String {
    let mut body = String::from("BACKEND  HEALTHY  LOAD  CONSECUTIVE_FAILURES\n");
    for status in statuses {
        body.push_str(&format!(
            "{}  {}  {}  {}\n",
            status.address, status.healthy, status.active_load, status.consecutive_failures
        ));
    }
    body
}
