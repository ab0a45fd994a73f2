//! Shared data types for the export pipeline: ledger and transaction
//! records, the persisted checkpoint cursor, and parsing helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One transaction as returned by the node, kept opaque apart from the
/// flags the validation gate inspects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, rename = "metaData", skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<Value>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl TransactionRecord {
    /// True when the node returned execution metadata under either of the
    /// two field names it uses.
    pub fn has_meta(&self) -> bool {
        self.meta.is_some() || self.meta_data.is_some()
    }

    /// The transaction hash, when present in the payload.
    pub fn hash(&self) -> Option<&str> {
        self.payload.get("hash").and_then(Value::as_str)
    }
}

/// One closed ledger with its ordered transaction list. Serialized for the
/// sink with the index under `primaryKey` so batches can be published keyed
/// by that field.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerRecord {
    #[serde(rename = "primaryKey")]
    pub index: u64,
    pub closed: bool,
    #[serde(flatten)]
    pub header: Map<String, Value>,
    pub transactions: Vec<TransactionRecord>,
}

/// Persisted cursor: the next ledger index to fetch. Always equals one past
/// the highest index ever successfully emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
}

impl Checkpoint {
    pub fn new(block_number: u64) -> Self {
        Self { block_number }
    }

    pub fn advance(&mut self, emitted: u64) {
        self.block_number = self.block_number.saturating_add(emitted);
    }
}

/// Parses a ledger index the node may encode as a number or a numeric
/// string.
pub fn parse_ledger_index(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
