use anyhow::{Context, Result};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Buckets for node response latency, in seconds.
const RESPONSE_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Prometheus counters and gauges shared across the exporter, scraped
/// through the health server's `/metrics` route.
pub struct Telemetry {
    registry: Registry,
    requests_total: IntCounterVec,
    response_latency_seconds: HistogramVec,
    downloaded_ledgers_total: IntCounter,
    downloaded_transactions_total: IntCounter,
    elided_transactions_total: IntCounter,
    exported_ledgers_total: IntCounter,
    last_exported_ledger: IntGauge,
    queue_depth: IntGaugeVec,
    endpoint_failovers_total: IntCounter,
}

impl Telemetry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "ledgerstream_requests_total",
                "Requests dispatched to node connections",
            ),
            &["connection", "command"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let response_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "ledgerstream_response_latency_seconds",
                "Node response latency",
            )
            .buckets(RESPONSE_LATENCY_BUCKETS.to_vec()),
            &["connection"],
        )?;
        registry.register(Box::new(response_latency_seconds.clone()))?;

        let downloaded_ledgers_total = IntCounter::new(
            "ledgerstream_downloaded_ledgers_total",
            "Ledgers fully downloaded",
        )?;
        registry.register(Box::new(downloaded_ledgers_total.clone()))?;

        let downloaded_transactions_total = IntCounter::new(
            "ledgerstream_downloaded_transactions_total",
            "Transactions downloaded across all ledgers",
        )?;
        registry.register(Box::new(downloaded_transactions_total.clone()))?;

        let elided_transactions_total = IntCounter::new(
            "ledgerstream_elided_transactions_total",
            "Transactions dropped because the node no longer serves them",
        )?;
        registry.register(Box::new(elided_transactions_total.clone()))?;

        let exported_ledgers_total = IntCounter::new(
            "ledgerstream_exported_ledgers_total",
            "Ledgers published to the sink",
        )?;
        registry.register(Box::new(exported_ledgers_total.clone()))?;

        let last_exported_ledger = IntGauge::new(
            "ledgerstream_last_exported_ledger",
            "Index of the most recently published ledger",
        )?;
        registry.register(Box::new(last_exported_ledger.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new(
                "ledgerstream_queue_depth",
                "Requests waiting or in flight per connection",
            ),
            &["connection"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let endpoint_failovers_total = IntCounter::new(
            "ledgerstream_endpoint_failovers_total",
            "Endpoint rotations after escalated cycle failures",
        )?;
        registry.register(Box::new(endpoint_failovers_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            response_latency_seconds,
            downloaded_ledgers_total,
            downloaded_transactions_total,
            elided_transactions_total,
            exported_ledgers_total,
            last_exported_ledger,
            queue_depth,
            endpoint_failovers_total,
        })
    }

    pub fn record_request(&self, connection: &str, command: &str) {
        self.requests_total
            .with_label_values(&[connection, command])
            .inc();
    }

    pub fn observe_response_latency(&self, connection: &str, elapsed: Duration) {
        self.response_latency_seconds
            .with_label_values(&[connection])
            .observe(elapsed.as_secs_f64());
    }

    pub fn queue_depth_inc(&self, connection: &str) {
        self.queue_depth.with_label_values(&[connection]).inc();
    }

    pub fn queue_depth_dec(&self, connection: &str) {
        self.queue_depth.with_label_values(&[connection]).dec();
    }

    pub fn record_ledger_downloaded(&self, transactions: u64) {
        self.downloaded_ledgers_total.inc();
        self.downloaded_transactions_total.inc_by(transactions);
    }

    pub fn record_elided_transactions(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.elided_transactions_total.inc_by(count);
    }

    pub fn record_exported(&self, last_exported: u64, count: u64) {
        self.exported_ledgers_total.inc_by(count);
        self.last_exported_ledger.set(last_exported as i64);
    }

    pub fn record_failover(&self) {
        self.endpoint_failovers_total.inc();
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid utf-8")
    }
}
