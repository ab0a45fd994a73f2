//! Batch accumulator enforcing the contiguity invariant: a batch's indices
//! always form a contiguous, strictly increasing range.

use crate::model::LedgerRecord;
use anyhow::{bail, Result};

pub struct BatchAccumulator {
    records: Vec<LedgerRecord>,
    next_index: u64,
}

impl BatchAccumulator {
    pub fn new(start_index: u64) -> Self {
        Self {
            records: Vec::new(),
            next_index: start_index,
        }
    }

    /// Appends the next record. Rejects anything that would break the
    /// contiguous range.
    pub fn push(&mut self, record: LedgerRecord) -> Result<()> {
        if record.index != self.next_index {
            bail!(
                "batch discontinuity: expected ledger {}, got {}",
                self.next_index,
                record.index
            );
        }
        self.next_index += 1;
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hands the accumulated contiguous run to the caller for emission.
    pub fn into_records(self) -> Vec<LedgerRecord> {
        self.records
    }
}
