//! Per-connection dispatch queue: a fair bounded-concurrency gate wrapping
//! every outbound request with instrumentation. At most K requests are in
//! flight per connection; admission is FIFO. The queue never retries and
//! never interprets errors.

use crate::node::session::{LedgerSession, SessionError};
use crate::runtime::telemetry::Telemetry;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

pub struct DispatchQueue {
    permits: Arc<Semaphore>,
    capacity: usize,
    connection: String,
    telemetry: Arc<Telemetry>,
}

impl DispatchQueue {
    pub fn new(max_in_flight: usize, connection_id: usize, telemetry: Arc<Telemetry>) -> Self {
        let capacity = max_in_flight.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            connection: connection_id.to_string(),
            telemetry,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Serializes one request through the queue. The depth gauge counts
    /// both waiting and in-flight requests.
    pub async fn dispatch(
        &self,
        session: &dyn LedgerSession,
        command: &'static str,
        params: Value,
    ) -> Result<Value, SessionError> {
        self.telemetry.queue_depth_inc(&self.connection);

        let result = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .expect("dispatch semaphore closed");
            self.telemetry.record_request(&self.connection, command);

            let start = Instant::now();
            let result = session.request(command, params).await;
            self.telemetry
                .observe_response_latency(&self.connection, start.elapsed());
            result
        }
        .await;

        self.telemetry.queue_depth_dec(&self.connection);
        result
    }
}
