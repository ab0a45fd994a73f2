use crate::export::orchestrator::Exporter;
use crate::export::sink::LedgerSink;
use crate::node::session::SessionConnector;
use crate::runtime::config::ExporterConfig;
use crate::runtime::health::{HealthServer, HealthState};
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wires together the exporter, the health server, and OS signal handling
/// for graceful shutdowns.
pub struct Runner<S: LedgerSink> {
    config: ExporterConfig,
    connector: Arc<dyn SessionConnector>,
    sink: Arc<S>,
    shutdown: CancellationToken,
}

impl<S: LedgerSink> Runner<S> {
    /// Creates a new runner and a root [`CancellationToken`] that propagates
    /// through the export loop.
    pub fn new(config: ExporterConfig, connector: Arc<dyn SessionConnector>, sink: Arc<S>) -> Self {
        Self {
            config,
            connector,
            sink,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the exporter until it finishes or the shutdown token is
    /// cancelled. The health server lives for exactly as long as the loop.
    pub async fn run(self) -> Result<()> {
        let telemetry = Arc::new(Telemetry::new().context("failed to build metrics registry")?);
        let health = Arc::new(HealthState::new(self.config.staleness_timeout()));

        let server = HealthServer::start(
            self.config.health_addr(),
            health.clone(),
            telemetry.clone(),
        )
        .await?;

        let exporter = Exporter::new(
            self.config,
            self.connector,
            self.sink,
            telemetry,
            health,
        )
        .await?;

        let result = exporter.run(self.shutdown).await;
        server.shutdown().await;
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is
    /// cancelled elsewhere.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received; shutting down exporter");
                shutdown.cancel();
            }
        });

        self.run().await
    }
}
