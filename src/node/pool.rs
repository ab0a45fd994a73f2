//! Connection pool manager. Owns a fixed-size group of sessions to one
//! endpoint at a time; rotates to the next candidate endpoint on failure.
//! The endpoint list is consumed strictly front-to-back and never
//! replenished within a process lifetime.

use crate::node::dispatch::DispatchQueue;
use crate::node::session::{LedgerSession, SessionConnector, SessionError};
use crate::runtime::telemetry::Telemetry;
use futures::future::join_all;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Raised when a failover finds no remaining endpoint candidates. Fatal:
/// external supervision is expected to restart the process, possibly with a
/// refreshed endpoint list.
#[derive(Debug, PartialEq, Eq)]
pub enum PoolError {
    EndpointsExhausted,
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::EndpointsExhausted => {
                write!(f, "no candidate node endpoints remain")
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// One live session bound to the current endpoint, with exclusive ownership
/// of its dispatch queue.
pub struct Connection {
    id: usize,
    endpoint: Arc<str>,
    session: Arc<dyn LedgerSession>,
    queue: DispatchQueue,
}

impl Connection {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// Sends one command through this connection's dispatch queue.
    pub async fn send(
        &self,
        command: &'static str,
        params: Value,
    ) -> Result<Value, SessionError> {
        self.queue.dispatch(self.session.as_ref(), command, params).await
    }
}

pub struct ConnectionPool {
    endpoints: VecDeque<String>,
    connector: Arc<dyn SessionConnector>,
    pool_size: usize,
    connection_concurrency: usize,
    telemetry: Arc<Telemetry>,
    connections: Vec<Arc<Connection>>,
}

impl ConnectionPool {
    pub fn new(
        endpoints: Vec<String>,
        pool_size: usize,
        connection_concurrency: usize,
        connector: Arc<dyn SessionConnector>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            endpoints: endpoints.into(),
            connector,
            pool_size: pool_size.max(1),
            connection_concurrency,
            telemetry,
            connections: Vec::new(),
        }
    }

    /// Pops the next candidate endpoint and opens a full connection group
    /// against it. An endpoint whose group cannot be opened is abandoned
    /// and the next candidate is tried; with no candidates left the pool
    /// reports exhaustion.
    pub async fn establish(&mut self) -> Result<(), PoolError> {
        loop {
            let endpoint = self
                .endpoints
                .pop_front()
                .ok_or(PoolError::EndpointsExhausted)?;

            tracing::info!(
                endpoint = %endpoint,
                pool_size = self.pool_size,
                remaining_candidates = self.endpoints.len(),
                "opening connection group"
            );

            let attempts = (0..self.pool_size).map(|_| self.connector.connect(&endpoint));
            let opened: Result<Vec<Arc<dyn LedgerSession>>, SessionError> =
                join_all(attempts).await.into_iter().collect();

            match opened {
                Ok(sessions) => {
                    let endpoint: Arc<str> = endpoint.into();
                    self.connections = sessions
                        .into_iter()
                        .enumerate()
                        .map(|(id, session)| {
                            Arc::new(Connection {
                                id,
                                endpoint: endpoint.clone(),
                                session,
                                queue: DispatchQueue::new(
                                    self.connection_concurrency,
                                    id,
                                    self.telemetry.clone(),
                                ),
                            })
                        })
                        .collect();
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        error = %err,
                        "failed to open connection group; trying next endpoint"
                    );
                }
            }
        }
    }

    /// Discards the current connection group and establishes against the
    /// next candidate endpoint. Never retries the failed endpoint.
    pub async fn failover(&mut self) -> Result<(), PoolError> {
        self.telemetry.record_failover();
        self.connections.clear();
        self.establish().await
    }

    /// Round-robin assignment by ledger index.
    pub fn connection_for(&self, index: u64) -> Arc<Connection> {
        debug_assert!(!self.connections.is_empty(), "pool used before establish");
        let slot = (index % self.connections.len() as u64) as usize;
        self.connections[slot].clone()
    }

    /// An arbitrary live connection, used for head queries.
    pub fn first(&self) -> Arc<Connection> {
        debug_assert!(!self.connections.is_empty(), "pool used before establish");
        self.connections[0].clone()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
