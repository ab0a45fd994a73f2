//! Downstream sink boundary: an atomic, order-preserving batched publisher
//! plus the position store that mirrors the exporter's checkpoint.

use crate::model::{Checkpoint, LedgerRecord};
use anyhow::Result;
use futures::future::BoxFuture;

/// Field name under which each record's ledger index is published.
pub const PRIMARY_KEY_FIELD: &str = "primaryKey";

pub trait LedgerSink: Send + Sync + 'static {
    /// Current connectivity, surfaced through the health endpoint.
    fn is_connected(&self) -> bool;

    /// Publishes one batch atomically, keyed by the given field. Order
    /// within the batch must be preserved.
    fn send_with_key<'a>(
        &'a self,
        records: &'a [LedgerRecord],
        key_field: &'static str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Last persisted checkpoint, if any.
    fn last_position<'a>(&'a self) -> BoxFuture<'a, Result<Option<Checkpoint>>>;

    /// Persists the checkpoint. Called only after the corresponding batch
    /// was successfully published.
    fn save_position<'a>(&'a self, position: Checkpoint) -> BoxFuture<'a, Result<()>>;
}
