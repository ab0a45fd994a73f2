//! Validation gate run over every candidate batch immediately before
//! emission. A rejection is fatal to the process: no endpoint can fix
//! non-final data, so failover would be ineffective.

use crate::model::LedgerRecord;

#[derive(Debug, PartialEq, Eq)]
pub enum GateViolation {
    /// A transaction explicitly reported `validated: false`.
    NotValidated { ledger: u64, position: usize },
    /// A transaction carries neither `meta` nor `metaData`, meaning the
    /// expansion was incomplete.
    MissingMeta { ledger: u64, position: usize },
}

impl std::fmt::Display for GateViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateViolation::NotValidated { ledger, position } => write!(
                f,
                "transaction {position} in ledger {ledger} is not validated"
            ),
            GateViolation::MissingMeta { ledger, position } => write!(
                f,
                "transaction {position} in ledger {ledger} has no execution metadata"
            ),
        }
    }
}

impl std::error::Error for GateViolation {}

/// Checks every transaction of every ledger in the batch. First violation
/// wins; the caller treats any violation as fatal.
pub fn check_batch(batch: &[LedgerRecord]) -> Result<(), GateViolation> {
    for record in batch {
        for (position, transaction) in record.transactions.iter().enumerate() {
            if transaction.validated == Some(false) {
                return Err(GateViolation::NotValidated {
                    ledger: record.index,
                    position,
                });
            }
            if !transaction.has_meta() {
                return Err(GateViolation::MissingMeta {
                    ledger: record.index,
                    position,
                });
            }
        }
    }
    Ok(())
}
