//! Batch accumulation, the downstream sink boundary, and the orchestrator
//! driving the catch-up-then-poll loop.

pub mod batch;
pub mod orchestrator;
pub mod sink;

pub use batch::BatchAccumulator;
pub use orchestrator::Exporter;
pub use sink::{LedgerSink, PRIMARY_KEY_FIELD};
