//! Per-ledger retrieval and the pre-emission validation gate.

pub mod gate;
pub mod ledger;

pub use gate::{check_batch, GateViolation};
pub use ledger::{fetch_ledger, validated_head, FetchError, LARGE_LEDGER_TX_THRESHOLD};
