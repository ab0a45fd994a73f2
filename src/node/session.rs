//! Session abstraction over the ledger node's wire protocol. The exporter
//! only ever issues `ledger` and `tx` commands and relies on the session to
//! surface a distinguishable "not found" condition for missing
//! transactions; every other failure is undifferentiated at this layer.

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One live session to a node endpoint.
pub trait LedgerSession: Send + Sync + 'static {
    /// Issues one command and resolves to the node's result payload.
    fn request<'a>(
        &'a self,
        command: &'static str,
        params: Value,
    ) -> BoxFuture<'a, Result<Value, SessionError>>;
}

/// Opens sessions against a given endpoint. The pool uses one connector for
/// every endpoint candidate.
pub trait SessionConnector: Send + Sync + 'static {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn LedgerSession>, SessionError>>;
}

/// Typed session failure. `NotFound` is the only variant callers are
/// allowed to interpret; everything else escalates unchanged.
#[derive(Debug)]
pub enum SessionError {
    NotFound,
    Timeout {
        command: &'static str,
        after: Duration,
    },
    Rpc {
        command: &'static str,
        code: i32,
        message: String,
    },
    Transport {
        command: &'static str,
        message: String,
    },
    Malformed {
        command: &'static str,
        message: String,
    },
    Connect {
        endpoint: String,
        message: String,
    },
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotFound => write!(f, "requested object not found on node"),
            SessionError::Timeout { command, after } => {
                write!(f, "{command} request timed out after {after:?}")
            }
            SessionError::Rpc {
                command,
                code,
                message,
            } => write!(f, "{command} request rejected (code={code}): {message}"),
            SessionError::Transport { command, message } => {
                write!(f, "{command} request transport failure: {message}")
            }
            SessionError::Malformed { command, message } => {
                write!(f, "{command} response malformed: {message}")
            }
            SessionError::Connect { endpoint, message } => {
                write!(f, "failed to connect to {endpoint}: {message}")
            }
        }
    }
}

impl std::error::Error for SessionError {}
