//! Health and metrics HTTP surface. `/healthcheck` reports sink
//! connectivity and export freshness; `/metrics` serves the Prometheus
//! text exposition.

use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Shared liveness signals written by the exporter loop and read by the
/// health route.
pub struct HealthState {
    sink_connected: AtomicBool,
    last_export: Mutex<Option<Instant>>,
    staleness_timeout: Duration,
}

impl HealthState {
    /// Starts healthy: the freshness clock begins at construction so a
    /// long initial catch-up is not reported as staleness.
    pub fn new(staleness_timeout: Duration) -> Self {
        Self {
            sink_connected: AtomicBool::new(true),
            last_export: Mutex::new(Some(Instant::now())),
            staleness_timeout,
        }
    }

    pub fn set_sink_connected(&self, connected: bool) {
        self.sink_connected.store(connected, Ordering::SeqCst);
    }

    pub fn mark_exported(&self) {
        let mut last = self.last_export.lock().expect("health state poisoned");
        *last = Some(Instant::now());
    }

    /// `None` when healthy, otherwise a short description of the fault.
    pub fn diagnosis(&self) -> Option<String> {
        if !self.sink_connected.load(Ordering::SeqCst) {
            return Some("sink is not connected".to_string());
        }

        let last = self.last_export.lock().expect("health state poisoned");
        match *last {
            Some(instant) if instant.elapsed() > self.staleness_timeout => Some(format!(
                "no batch exported for {}s",
                instant.elapsed().as_secs()
            )),
            None => Some("no batch exported yet".to_string()),
            Some(_) => None,
        }
    }
}

pub struct HealthServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HealthServer {
    pub async fn start(
        addr: SocketAddr,
        state: Arc<HealthState>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind health listener")?;
        let local_addr = listener
            .local_addr()
            .context("failed to read health listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert health listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set health listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let state = state.clone();
            let telemetry = telemetry.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    serve_request(state.clone(), telemetry.clone(), req)
                }))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build health HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                tracing::error!(error = %err, "health server stopped");
            }
        });

        tracing::info!(addr = %local_addr, "health server listening");

        Ok(Self {
            addr: local_addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Bound address; differs from the configured one when port 0 was
    /// requested.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    state: Arc<HealthState>,
    telemetry: Arc<Telemetry>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(plain_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "unsupported method",
        ));
    }

    let response = match req.uri().path() {
        "/healthcheck" => match state.diagnosis() {
            None => plain_response(StatusCode::OK, "ok"),
            Some(reason) => plain_response(StatusCode::INTERNAL_SERVER_ERROR, reason),
        },
        "/metrics" => match telemetry.encode_text() {
            Ok(text) => plain_response(StatusCode::OK, text),
            Err(err) => plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to render metrics: {err}"),
            ),
        },
        _ => plain_response(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

fn plain_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}
