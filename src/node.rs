//! Node-client boundary: the session trait implemented by wire clients,
//! the per-connection dispatch queue, and the endpoint-rotating connection
//! pool.

pub mod dispatch;
pub mod jsonrpc;
pub mod pool;
pub mod session;

pub use dispatch::DispatchQueue;
pub use jsonrpc::{JsonRpcConnector, JsonRpcSession, JsonRpcSessionOptions};
pub use pool::{Connection, ConnectionPool, PoolError};
pub use session::{LedgerSession, SessionConnector, SessionError};
