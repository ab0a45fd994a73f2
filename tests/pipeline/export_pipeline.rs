use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use crate::support::helpers::{
    init_tracing, spawn_exporter, test_config, test_config_builder, wait_until,
};
use crate::support::mock_node::{MockConnector, MockNode};
use crate::support::mock_sink::RecordingSink;
use ledgerstream::PRIMARY_KEY_FIELD;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn exports_one_contiguous_batch_and_checkpoints() {
    init_tracing();
    let node = MockNode::new();
    node.add_ledger_range(32570..=32600, 2);
    node.set_validated_head(32600);

    let connector = MockConnector::new();
    connector.route("http://node-a", node.clone());
    let sink = RecordingSink::new();

    let (handle, token) = spawn_exporter(
        test_config(&["http://node-a"], 32570),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    wait_until("the first batch", WAIT, || sink.batch_count() >= 1)
        .await
        .unwrap();
    token.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    assert!(node.head_requests() >= 1);

    // Head 32600 minus the default confirmation depth of 20 gives a
    // ceiling of 32580, so exactly 32570..=32580 is exportable.
    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].key_field, PRIMARY_KEY_FIELD);
    let indices: Vec<u64> = batches[0].records.iter().map(|r| r.index).collect();
    assert_eq!(indices, (32570..=32580).collect::<Vec<_>>());
    assert_eq!(sink.last_saved().unwrap().block_number, 32581);
}

#[tokio::test]
async fn splits_the_window_into_bounded_batches() {
    init_tracing();
    let node = MockNode::new();
    node.add_ledger_range(100..=111, 1);
    node.set_validated_head(131);

    let connector = MockConnector::new();
    connector.route("http://node-a", node);
    let sink = RecordingSink::new();

    let config = test_config_builder(&["http://node-a"], 100)
        .batch_size(5)
        .build()
        .unwrap();
    let (handle, token) = spawn_exporter(config, connector, sink.clone())
        .await
        .unwrap();

    wait_until("all three batches", WAIT, || sink.batch_count() >= 3)
        .await
        .unwrap();
    token.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    let sizes: Vec<usize> = sink.batches().iter().map(|b| b.records.len()).collect();
    assert_eq!(sizes, vec![5, 5, 2]);
    let positions: Vec<u64> = sink
        .saved_positions()
        .iter()
        .map(|p| p.block_number)
        .collect();
    assert_eq!(positions, vec![105, 110, 112]);
    assert_eq!(sink.published_indices(), (100..=111).collect::<Vec<_>>());
}

#[tokio::test]
async fn empty_ledger_needs_only_the_summary_request() {
    init_tracing();
    let node = MockNode::new();
    node.add_ledger(100, 0);
    node.set_validated_head(120);

    let connector = MockConnector::new();
    connector.route("http://node-a", node.clone());
    let sink = RecordingSink::new();

    let (handle, token) = spawn_exporter(
        test_config(&["http://node-a"], 100),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    wait_until("the empty ledger", WAIT, || sink.batch_count() >= 1)
        .await
        .unwrap();
    token.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    assert_eq!(node.summary_requests(), 1);
    assert_eq!(node.expanded_requests(), 0);
    assert_eq!(node.tx_requests(), 0);

    let batches = sink.batches();
    assert_eq!(batches[0].records[0].index, 100);
    assert!(batches[0].records[0].transactions.is_empty());
}

#[tokio::test]
async fn small_ledger_uses_one_expanded_request() {
    init_tracing();
    let node = MockNode::new();
    node.add_ledger(100, 3);
    node.set_validated_head(120);

    let connector = MockConnector::new();
    connector.route("http://node-a", node.clone());
    let sink = RecordingSink::new();

    let (handle, token) = spawn_exporter(
        test_config(&["http://node-a"], 100),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    wait_until("the expanded ledger", WAIT, || sink.batch_count() >= 1)
        .await
        .unwrap();
    token.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    assert_eq!(node.expanded_requests(), 1);
    assert_eq!(node.tx_requests(), 0);

    let batches = sink.batches();
    let record = &batches[0].records[0];
    assert_eq!(record.transactions.len(), 3);
    assert!(record.transactions.iter().all(|tx| tx.has_meta()));
}

#[tokio::test]
async fn large_ledger_fans_out_per_transaction_and_elides_missing_details() {
    init_tracing();
    let node = MockNode::new();
    let hashes = node.add_ledger(100, 205);
    node.set_validated_head(120);
    node.mark_transaction_missing(&hashes[10]);
    node.mark_transaction_missing(&hashes[100]);
    node.mark_transaction_missing(&hashes[204]);

    let connector = MockConnector::new();
    connector.route("http://node-a", node.clone());
    let sink = RecordingSink::new();

    let (handle, token) = spawn_exporter(
        test_config(&["http://node-a"], 100),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    wait_until("the large ledger", WAIT, || sink.batch_count() >= 1)
        .await
        .unwrap();
    token.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    assert_eq!(node.tx_requests(), 205);
    assert_eq!(node.expanded_requests(), 0);

    // Missing details are elided; survivors keep the summary order.
    let batches = sink.batches();
    let record = &batches[0].records[0];
    let published: Vec<&str> = record
        .transactions
        .iter()
        .filter_map(|tx| tx.hash())
        .collect();
    let expected: Vec<&str> = hashes
        .iter()
        .enumerate()
        .filter(|(position, _)| ![10, 100, 204].contains(position))
        .map(|(_, hash)| hash.as_str())
        .collect();
    assert_eq!(published.len(), 202);
    assert_eq!(published, expected);
}

#[tokio::test]
async fn transaction_without_meta_terminates_the_exporter() {
    init_tracing();
    let node = MockNode::new();
    node.insert_ledger(
        100,
        true,
        vec![json!({ "hash": "AAAA000000000000", "validated": true })],
    );
    node.set_validated_head(120);

    let connector = MockConnector::new();
    connector.route("http://node-a", node);
    let sink = RecordingSink::new();

    let (handle, _token) = spawn_exporter(
        test_config(&["http://node-a"], 100),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("non-final"));
    assert_eq!(sink.batch_count(), 0);
    assert!(sink.saved_positions().is_empty());
}

#[tokio::test]
async fn unvalidated_transaction_terminates_the_exporter() {
    init_tracing();
    let node = MockNode::new();
    node.insert_ledger(
        100,
        true,
        vec![json!({
            "hash": "BBBB000000000000",
            "validated": false,
            "metaData": { "TransactionResult": "tesSUCCESS" },
        })],
    );
    node.set_validated_head(120);

    let connector = MockConnector::new();
    connector.route("http://node-a", node);
    let sink = RecordingSink::new();

    let (handle, _token) = spawn_exporter(
        test_config(&["http://node-a"], 100),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("not validated"));
    assert_eq!(sink.batch_count(), 0);
}

#[tokio::test]
async fn failed_publish_does_not_advance_the_checkpoint() {
    init_tracing();
    let node = MockNode::new();
    node.add_ledger(100, 1);
    node.set_validated_head(120);

    let connector = MockConnector::new();
    connector.route("http://node-a", node);
    let sink = RecordingSink::new();
    sink.set_fail_publish(true);

    let (handle, _token) = spawn_exporter(
        test_config(&["http://node-a"], 100),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    // The publish failure escalates; with a single endpoint the pool is
    // exhausted on failover and the loop terminates.
    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(result.is_err());
    assert_eq!(sink.batch_count(), 0);
    assert!(sink.saved_positions().is_empty());
}

#[tokio::test]
async fn resumes_from_the_persisted_sink_position() {
    init_tracing();
    let node = MockNode::new();
    node.add_ledger_range(32570..=32600, 1);
    node.set_validated_head(32600);

    let connector = MockConnector::new();
    connector.route("http://node-a", node);
    let sink = RecordingSink::new();
    sink.set_initial_position(32575);

    let (handle, token) = spawn_exporter(
        test_config(&["http://node-a"], 32570),
        connector,
        sink.clone(),
    )
    .await
    .unwrap();

    wait_until("the resumed batch", WAIT, || sink.batch_count() >= 1)
        .await
        .unwrap();
    token.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    assert_eq!(sink.published_indices(), (32575..=32580).collect::<Vec<_>>());
    assert_eq!(sink.last_saved().unwrap().block_number, 32581);
}
