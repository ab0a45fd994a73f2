//! Adaptive per-ledger fetch. A ledger is retrieved either in one expanded
//! round trip or, past the large-ledger threshold, via one concurrent
//! detail request per listed transaction. The strategy switch trades
//! round-trip count against per-request payload size and keeps large
//! ledgers resilient to individual transaction retrieval gaps.

use crate::model::{parse_ledger_index, LedgerRecord, TransactionRecord};
use crate::node::pool::Connection;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::future::join_all;
use serde_json::{json, Map, Value};

/// Above this many listed transactions the fetcher switches from one
/// expanded request to per-transaction detail requests.
pub const LARGE_LEDGER_TX_THRESHOLD: usize = 200;

/// Integrity faults surfaced by the fetch path. Both escalate the current
/// cycle; neither is retried locally.
#[derive(Debug)]
pub enum FetchError {
    LedgerNotClosed { index: u64 },
    MalformedResponse { index: u64, reason: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::LedgerNotClosed { index } => {
                write!(f, "ledger {index} reported as not closed")
            }
            FetchError::MalformedResponse { index, reason } => {
                write!(f, "malformed response for ledger {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Queries the current validated head ledger index through one connection.
pub async fn validated_head(connection: &Connection) -> Result<u64> {
    let payload = connection
        .send(
            "ledger",
            json!({ "ledger_index": "validated", "transactions": false, "expand": false }),
        )
        .await
        .context("validated head request failed")?;

    let index = payload
        .get("ledger")
        .and_then(|ledger| ledger.get("ledger_index"))
        .or_else(|| payload.get("ledger_index"))
        .and_then(|value| parse_ledger_index(value));

    index.ok_or_else(|| {
        FetchError::MalformedResponse {
            index: 0,
            reason: "validated head response carries no ledger_index".to_owned(),
        }
        .into()
    })
}

/// Fetches one closed ledger with its fully expanded transaction list.
pub async fn fetch_ledger(
    connection: &Connection,
    index: u64,
    telemetry: &Telemetry,
) -> Result<LedgerRecord> {
    let summary = connection
        .send(
            "ledger",
            json!({ "ledger_index": index, "transactions": true, "expand": false }),
        )
        .await
        .with_context(|| format!("ledger {index} summary request failed"))?;

    let (header, closed, hashes) = parse_summary(summary, index)?;
    if !closed {
        return Err(FetchError::LedgerNotClosed { index }.into());
    }

    let transactions = if hashes.is_empty() {
        Vec::new()
    } else if hashes.len() > LARGE_LEDGER_TX_THRESHOLD {
        fetch_transactions_individually(connection, index, &hashes, telemetry).await?
    } else {
        fetch_expanded(connection, index).await?
    };

    telemetry.record_ledger_downloaded(transactions.len() as u64);

    Ok(LedgerRecord {
        index,
        closed,
        header,
        transactions,
    })
}

/// One combined round trip carrying the full expanded transaction list.
async fn fetch_expanded(connection: &Connection, index: u64) -> Result<Vec<TransactionRecord>> {
    let payload = connection
        .send(
            "ledger",
            json!({ "ledger_index": index, "transactions": true, "expand": true }),
        )
        .await
        .with_context(|| format!("ledger {index} expanded request failed"))?;

    let entries = payload
        .get("ledger")
        .and_then(|ledger| ledger.get("transactions"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| FetchError::MalformedResponse {
            index,
            reason: "expanded response carries no transaction array".to_owned(),
        })?;

    entries
        .into_iter()
        .map(|entry| parse_transaction(entry, index))
        .collect()
}

/// One concurrent detail request per listed transaction, bounded only by
/// the owning dispatch queue. Output order matches the summary order, not
/// arrival order; a "not found" detail elides that transaction.
async fn fetch_transactions_individually(
    connection: &Connection,
    index: u64,
    hashes: &[String],
    telemetry: &Telemetry,
) -> Result<Vec<TransactionRecord>> {
    let requests = hashes.iter().map(|hash| {
        connection.send("tx", json!({ "transaction": hash, "binary": false }))
    });
    let results = join_all(requests).await;

    let mut transactions = Vec::with_capacity(hashes.len());
    let mut elided = 0u64;

    for (hash, result) in hashes.iter().zip(results) {
        match result {
            Ok(payload) => transactions.push(parse_transaction(payload, index)?),
            Err(err) if err.is_not_found() => {
                elided += 1;
                tracing::debug!(ledger = index, tx = %hash, "transaction detail not found; eliding");
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("transaction detail request failed for ledger {index}"));
            }
        }
    }

    if elided > 0 {
        telemetry.record_elided_transactions(elided);
        tracing::warn!(ledger = index, elided, "elided missing transaction details");
    }

    Ok(transactions)
}

/// Splits a summary response into the raw header map, the closed flag, and
/// the listed transaction hashes. The `transactions` and `closed` keys are
/// lifted out of the header so the record serializes them exactly once.
fn parse_summary(payload: Value, index: u64) -> Result<(Map<String, Value>, bool, Vec<String>)> {
    let mut header = payload
        .get("ledger")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| FetchError::MalformedResponse {
            index,
            reason: "summary response carries no ledger object".to_owned(),
        })?;

    let closed = header
        .remove("closed")
        .as_ref()
        .and_then(Value::as_bool)
        .ok_or_else(|| FetchError::MalformedResponse {
            index,
            reason: "summary response carries no closed flag".to_owned(),
        })?;

    let hashes = match header.remove("transactions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(hash) => Ok(hash),
                other => Err(FetchError::MalformedResponse {
                    index,
                    reason: format!("summary transaction list entry is not a hash: {other}"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(FetchError::MalformedResponse {
                index,
                reason: format!("summary transaction list has unexpected shape: {other}"),
            }
            .into())
        }
    };

    Ok((header, closed, hashes))
}

fn parse_transaction(payload: Value, index: u64) -> Result<TransactionRecord> {
    serde_json::from_value(payload)
        .map_err(|err| {
            FetchError::MalformedResponse {
                index,
                reason: format!("transaction entry failed to parse: {err}"),
            }
            .into()
        })
}
