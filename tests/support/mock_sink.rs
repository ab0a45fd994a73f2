use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use ledgerstream::{Checkpoint, LedgerRecord, LedgerSink};

#[derive(Clone)]
pub struct PublishedBatch {
    pub key_field: &'static str,
    pub records: Vec<LedgerRecord>,
}

/// Sink double that records every published batch and saved position.
pub struct RecordingSink {
    connected: AtomicBool,
    fail_publish: AtomicBool,
    initial_position: Mutex<Option<Checkpoint>>,
    batches: Mutex<Vec<PublishedBatch>>,
    saved_positions: Mutex<Vec<Checkpoint>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            fail_publish: AtomicBool::new(false),
            initial_position: Mutex::new(None),
            batches: Mutex::new(Vec::new()),
            saved_positions: Mutex::new(Vec::new()),
        })
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Position reported to the exporter at startup, as if persisted by a
    /// previous run.
    pub fn set_initial_position(&self, block_number: u64) {
        let mut guard = self.initial_position.lock().unwrap();
        *guard = Some(Checkpoint::new(block_number));
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batches(&self) -> Vec<PublishedBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn published_indices(&self) -> Vec<u64> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|batch| batch.records.iter().map(|record| record.index))
            .collect()
    }

    pub fn saved_positions(&self) -> Vec<Checkpoint> {
        self.saved_positions.lock().unwrap().clone()
    }

    pub fn last_saved(&self) -> Option<Checkpoint> {
        self.saved_positions.lock().unwrap().last().copied()
    }
}

impl LedgerSink for RecordingSink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_with_key<'a>(
        &'a self,
        records: &'a [LedgerRecord],
        key_field: &'static str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_publish.load(Ordering::SeqCst) {
                bail!("sink refused the batch");
            }
            self.batches.lock().unwrap().push(PublishedBatch {
                key_field,
                records: records.to_vec(),
            });
            Ok(())
        })
    }

    fn last_position<'a>(&'a self) -> BoxFuture<'a, Result<Option<Checkpoint>>> {
        Box::pin(async move { Ok(*self.initial_position.lock().unwrap()) })
    }

    fn save_position<'a>(&'a self, position: Checkpoint) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.saved_positions.lock().unwrap().push(position);
            Ok(())
        })
    }
}
