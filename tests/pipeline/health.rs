use std::sync::Arc;
use std::time::Duration;

use hyper::{body, Client, StatusCode, Uri};
use tokio::time::sleep;

use crate::support::helpers::init_tracing;
use ledgerstream::{HealthServer, HealthState, Telemetry};

async fn get(client: &Client<hyper::client::HttpConnector>, url: String) -> (StatusCode, String) {
    let uri: Uri = url.parse().expect("test URL must parse");
    let response = client.get(uri).await.expect("request must succeed");
    let status = response.status();
    let bytes = body::to_bytes(response.into_body())
        .await
        .expect("body must be readable");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn healthcheck_reflects_sink_connectivity() {
    init_tracing();
    let telemetry = Arc::new(Telemetry::new().unwrap());
    let state = Arc::new(HealthState::new(Duration::from_secs(60)));
    let server = HealthServer::start(
        "127.0.0.1:0".parse().unwrap(),
        state.clone(),
        telemetry,
    )
    .await
    .unwrap();
    let base = format!("http://{}", server.addr());
    let client = Client::new();

    let (status, text) = get(&client, format!("{base}/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "ok");

    state.set_sink_connected(false);
    let (status, text) = get(&client, format!("{base}/healthcheck")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text.contains("sink"));

    state.set_sink_connected(true);
    let (status, _) = get(&client, format!("{base}/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn healthcheck_reports_stale_exports() {
    init_tracing();
    let telemetry = Arc::new(Telemetry::new().unwrap());
    let state = Arc::new(HealthState::new(Duration::from_millis(10)));
    let server = HealthServer::start(
        "127.0.0.1:0".parse().unwrap(),
        state.clone(),
        telemetry,
    )
    .await
    .unwrap();
    let base = format!("http://{}", server.addr());
    let client = Client::new();

    sleep(Duration::from_millis(50)).await;
    let (status, text) = get(&client, format!("{base}/healthcheck")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text.contains("no batch exported"));

    state.mark_exported();
    let (status, _) = get(&client, format!("{base}/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn metrics_route_serves_the_text_exposition() {
    init_tracing();
    let telemetry = Arc::new(Telemetry::new().unwrap());
    telemetry.record_exported(32580, 11);
    let state = Arc::new(HealthState::new(Duration::from_secs(60)));
    let server = HealthServer::start(
        "127.0.0.1:0".parse().unwrap(),
        state,
        telemetry,
    )
    .await
    .unwrap();
    let base = format!("http://{}", server.addr());
    let client = Client::new();

    let (status, text) = get(&client, format!("{base}/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("ledgerstream_last_exported_ledger 32580"));
    assert!(text.contains("ledgerstream_exported_ledgers_total 11"));

    let (status, _) = get(&client, format!("{base}/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.shutdown().await;
}
