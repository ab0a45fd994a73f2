//! Batch orchestrator: the single control loop that drives catch-up
//! cycles, owns the in-memory checkpoint cursor and the live connection
//! set, and decides between endpoint failover and process termination when
//! a cycle fails.

use crate::export::batch::BatchAccumulator;
use crate::export::sink::{LedgerSink, PRIMARY_KEY_FIELD};
use crate::fetch::gate::check_batch;
use crate::fetch::ledger::{fetch_ledger, validated_head};
use crate::model::{Checkpoint, LedgerRecord};
use crate::node::pool::{ConnectionPool, PoolError};
use crate::node::session::SessionConnector;
use crate::runtime::config::ExporterConfig;
use crate::runtime::health::HealthState;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Failure of one catch-up cycle. Escalated failures abort the cycle and
/// rotate the pool to the next endpoint; fatal failures exit the loop.
enum CycleError {
    Escalated(anyhow::Error),
    Fatal(anyhow::Error),
}

pub struct Exporter<S: LedgerSink> {
    config: ExporterConfig,
    pool: ConnectionPool,
    sink: Arc<S>,
    checkpoint: Checkpoint,
    telemetry: Arc<Telemetry>,
    health: Arc<HealthState>,
}

impl<S: LedgerSink> Exporter<S> {
    /// Opens the initial connection group and resumes from the sink's
    /// persisted position, falling back to the configured start index.
    pub async fn new(
        config: ExporterConfig,
        connector: Arc<dyn SessionConnector>,
        sink: Arc<S>,
        telemetry: Arc<Telemetry>,
        health: Arc<HealthState>,
    ) -> Result<Self> {
        let mut pool = ConnectionPool::new(
            config.endpoints().to_vec(),
            config.pool_size(),
            config.connection_concurrency(),
            connector,
            telemetry.clone(),
        );
        pool.establish()
            .await
            .context("failed to open the initial connection group")?;

        let checkpoint = match sink
            .last_position()
            .await
            .context("failed to load the persisted checkpoint")?
        {
            Some(position) => position,
            None => Checkpoint::new(config.start_index()),
        };

        tracing::info!(
            next_index = checkpoint.block_number,
            endpoint = %pool.first().endpoint(),
            connections = pool.len(),
            "exporter initialized"
        );

        Ok(Self {
            config,
            pool,
            sink,
            checkpoint,
            telemetry,
            health,
        })
    }

    /// Next ledger index the exporter will fetch.
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    /// Perpetual catch-up-then-poll loop. Returns `Ok` only on requested
    /// shutdown; any returned error is fatal to the process.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                tracing::info!("exporter shutting down");
                return Ok(());
            }

            match self.run_cycle().await {
                Ok(()) => {}
                Err(CycleError::Escalated(err)) => {
                    tracing::warn!(error = %err, "export cycle failed; rotating to next endpoint");
                    if let Err(PoolError::EndpointsExhausted) = self.pool.failover().await {
                        return Err(anyhow::Error::new(PoolError::EndpointsExhausted)
                            .context("cycle failed and no endpoints remain"));
                    }
                }
                Err(CycleError::Fatal(err)) => {
                    tracing::error!(error = %err, "fatal export fault; terminating");
                    return Err(err);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("exporter shutting down");
                    return Ok(());
                }
                _ = sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// One full cycle: compute the confirmation ceiling, then walk the
    /// window in batches until the checkpoint passes it.
    async fn run_cycle(&mut self) -> Result<(), CycleError> {
        self.health.set_sink_connected(self.sink.is_connected());

        let head = validated_head(self.pool.first().as_ref())
            .await
            .map_err(CycleError::Escalated)?;
        let ceiling = head.saturating_sub(self.config.confirmation_depth());

        if self.checkpoint.block_number > ceiling {
            tracing::debug!(
                next_index = self.checkpoint.block_number,
                ceiling,
                "nothing below the confirmation ceiling to export"
            );
            return Ok(());
        }

        tracing::info!(
            from = self.checkpoint.block_number,
            ceiling,
            "starting catch-up window"
        );

        while self.checkpoint.block_number <= ceiling {
            let start = self.checkpoint.block_number;
            let end = ceiling.min(start + self.config.batch_size() as u64 - 1);

            let batch = self
                .fetch_window(start, end)
                .await
                .map_err(CycleError::Escalated)?;

            check_batch(&batch).map_err(|violation| {
                CycleError::Fatal(
                    anyhow::Error::new(violation)
                        .context("refusing to export non-final ledger data"),
                )
            })?;

            self.emit(batch).await.map_err(CycleError::Escalated)?;
        }

        Ok(())
    }

    /// Fans out one window of fetches across the pool, round-robin by
    /// index, with at most one batch's worth in flight.
    async fn fetch_window(&self, start: u64, end: u64) -> Result<Vec<LedgerRecord>> {
        let fetches = (start..=end).map(|index| {
            let connection = self.pool.connection_for(index);
            let telemetry = self.telemetry.clone();
            async move { fetch_ledger(connection.as_ref(), index, telemetry.as_ref()).await }
        });
        let results = join_all(fetches).await;

        let mut accumulator = BatchAccumulator::new(start);
        for result in results {
            accumulator.push(result?)?;
        }
        Ok(accumulator.into_records())
    }

    /// Emit-then-advance: the checkpoint is persisted only after the batch
    /// was published, so a crash re-delivers the last in-flight batch
    /// instead of skipping it.
    async fn emit(&mut self, batch: Vec<LedgerRecord>) -> Result<()> {
        let emitted = batch.len() as u64;

        self.sink
            .send_with_key(&batch, PRIMARY_KEY_FIELD)
            .await
            .context("sink publish failed")?;

        self.checkpoint.advance(emitted);
        self.sink
            .save_position(self.checkpoint)
            .await
            .context("failed to persist the checkpoint")?;

        let last_exported = self.checkpoint.block_number.saturating_sub(1);
        self.telemetry.record_exported(last_exported, emitted);
        self.health.mark_exported();

        tracing::info!(batch = emitted, last_exported, "batch exported");
        Ok(())
    }
}
