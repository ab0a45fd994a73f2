pub mod export;
pub mod fetch;
pub mod model;
pub mod node;
pub mod runtime;

pub use export::batch::BatchAccumulator;
pub use export::orchestrator::Exporter;
pub use export::sink::{LedgerSink, PRIMARY_KEY_FIELD};
pub use fetch::gate::GateViolation;
pub use fetch::ledger::{FetchError, LARGE_LEDGER_TX_THRESHOLD};
pub use model::{Checkpoint, LedgerRecord, TransactionRecord};
pub use node::dispatch::DispatchQueue;
pub use node::jsonrpc::{JsonRpcConnector, JsonRpcSession, JsonRpcSessionOptions};
pub use node::pool::{Connection, ConnectionPool, PoolError};
pub use node::session::{LedgerSession, SessionConnector, SessionError};
pub use runtime::config::{ExporterConfig, ExporterConfigBuilder, ExporterConfigParams};
pub use runtime::health::{HealthServer, HealthState};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry};
