//! JSON-RPC implementation of the session boundary using jsonrpsee's HTTP
//! client. Node commands map to JSON-RPC methods with a single object
//! parameter; the node's "transaction not found" error code is the only
//! error given a dedicated variant.

use crate::node::session::{LedgerSession, SessionConnector, SessionError};
use futures::future::BoxFuture;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Error code the node returns for a missing transaction (`txnNotFound`).
const TXN_NOT_FOUND_CODE: i32 = 29;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 256;

#[derive(Debug, Clone)]
pub struct JsonRpcSessionOptions {
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
}

impl Default for JsonRpcSessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

/// One HTTP JSON-RPC session bound to a single endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcSession {
    client: HttpClient,
    request_timeout: Duration,
}

impl JsonRpcSession {
    pub fn open(endpoint: &str, options: &JsonRpcSessionOptions) -> Result<Self, SessionError> {
        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .build(endpoint)
            .map_err(|err| SessionError::Connect {
                endpoint: endpoint.to_owned(),
                message: err.to_string(),
            })?;

        Ok(Self {
            client,
            request_timeout: options.request_timeout,
        })
    }
}

impl LedgerSession for JsonRpcSession {
    fn request<'a>(
        &'a self,
        command: &'static str,
        params: Value,
    ) -> BoxFuture<'a, Result<Value, SessionError>> {
        Box::pin(async move {
            timeout(
                self.request_timeout,
                self.client.request::<Value, _>(command, rpc_params![params]),
            )
            .await
            .map_err(|_| SessionError::Timeout {
                command,
                after: self.request_timeout,
            })?
            .map_err(|err| map_client_error(command, err))
        })
    }
}

fn map_client_error(command: &'static str, err: JsonRpcError) -> SessionError {
    match err {
        JsonRpcError::Call(object) if object.code() == TXN_NOT_FOUND_CODE => {
            SessionError::NotFound
        }
        JsonRpcError::Call(object) => SessionError::Rpc {
            command,
            code: object.code(),
            message: object.message().to_owned(),
        },
        JsonRpcError::RequestTimeout => SessionError::Timeout {
            command,
            after: Duration::ZERO,
        },
        JsonRpcError::ParseError(err) => SessionError::Malformed {
            command,
            message: err.to_string(),
        },
        other => SessionError::Transport {
            command,
            message: other.to_string(),
        },
    }
}

/// Connector handed to the pool so every endpoint attempt opens fresh HTTP
/// sessions with the same options.
#[derive(Debug, Clone, Default)]
pub struct JsonRpcConnector {
    options: JsonRpcSessionOptions,
}

impl JsonRpcConnector {
    pub fn new(options: JsonRpcSessionOptions) -> Self {
        Self { options }
    }

    pub fn with_request_timeout(timeout: Duration) -> Self {
        Self {
            options: JsonRpcSessionOptions {
                request_timeout: timeout,
                ..JsonRpcSessionOptions::default()
            },
        }
    }
}

impl SessionConnector for JsonRpcConnector {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn LedgerSession>, SessionError>> {
        Box::pin(async move {
            let session = JsonRpcSession::open(endpoint, &self.options)?;
            Ok(Arc::new(session) as Arc<dyn LedgerSession>)
        })
    }
}
