use bitcoin::consensus::encode::serialize_hex;

use covenant_token::config::ExplorerConfig;
use covenant_token::errors::{BroadcastRejection, ExplorerError};
use covenant_token::explorer::ExplorerClient;

use crate::common::fixtures::{outpoint, transaction};
use crate::common::mock_http::{MockResponse, MockServer};

fn explorer_config(url: &str) -> ExplorerConfig {
    ExplorerConfig {
        url: url.to_string(),
        timeout_seconds: 2,
        max_retries: 3,
        initial_backoff_ms: 10,
        backoff_multiplier: 2.0,
        max_backoff_seconds: 1,
        concurrent_requests: 2,
        cache_capacity: 16,
    }
}

#[tokio::test]
async fn test_raw_transaction_is_cached() {
    let tx = transaction(&[outpoint(1, 0)], &[1_000]);
    let txid = tx.compute_txid().to_string();
    let server = MockServer::start(vec![MockResponse::json(200, serialize_hex(&tx))]).await;

    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();
    let fetched = client.get_transaction(&txid).await.unwrap();
    assert_eq!(fetched, tx);
    let again = client.get_raw_transaction(&txid).await.unwrap();
    assert_eq!(again, serialize_hex(&tx));

    assert_eq!(server.hits(), 1);
    assert_eq!(server.requests()[0].path, format!("/tx/{}/hex", txid));
    let stats = client.get_cache_stats();
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_missing_transaction_is_not_retried() {
    let server = MockServer::start(vec![MockResponse::json(404, "Not Found")]).await;
    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();

    let txid = outpoint(2, 0).txid.to_string();
    let err = client.get_raw_transaction(&txid).await.unwrap_err();
    assert!(matches!(err, ExplorerError::TransactionNotFound { .. }));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_invalid_txid_never_reaches_network() {
    let server = MockServer::start(vec![MockResponse::json(200, "00")]).await;
    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();

    let err = client.get_raw_transaction("xyz").await.unwrap_err();
    assert!(matches!(err, ExplorerError::InvalidTxid { .. }));
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn test_list_unspent() {
    let body = r#"[{"height":0,"tx_pos":1,"tx_hash":"0101010101010101010101010101010101010101010101010101010101010101","value":25000}]"#;
    let server = MockServer::start(vec![
        MockResponse::json(500, "{}"),
        MockResponse::json(200, body),
    ])
    .await;
    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();

    let unspent = client.list_unspent("mxyz").await.unwrap();
    assert_eq!(unspent.len(), 1);
    assert_eq!(unspent[0].value, 25_000);
    assert_eq!(unspent[0].tx_pos, 1);
    assert_eq!(server.hits(), 2);
    assert_eq!(client.get_error_count(), 1);
}

#[tokio::test]
async fn test_broadcast_rejection_is_classified() {
    let server = MockServer::start(vec![MockResponse::json(
        400,
        "unexpected response code 500: 66: insufficient priority",
    )])
    .await;
    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();

    let err = client.broadcast("0100").await.unwrap_err();
    assert!(matches!(
        err,
        ExplorerError::BroadcastRejected(BroadcastRejection::InsufficientFee)
    ));
    assert_eq!(server.hits(), 1);
    assert!(server.requests()[0].body.contains("\"txhex\":\"0100\""));
}

#[tokio::test]
async fn test_broadcast_returns_txid() {
    let txid = outpoint(3, 0).txid;
    let server =
        MockServer::start(vec![MockResponse::json(200, format!("\"{}\"", txid))]).await;
    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();

    assert_eq!(client.broadcast("0100").await.unwrap(), txid);
}

#[tokio::test]
async fn test_resent_broadcast_already_in_chain_is_success() {
    let tx = transaction(&[outpoint(4, 1)], &[2_000]);
    let server = MockServer::start(vec![
        MockResponse::json(503, "Service Unavailable"),
        MockResponse::json(400, "257: txn-already-known"),
    ])
    .await;
    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();

    let txid = client.broadcast(&serialize_hex(&tx)).await.unwrap();
    assert_eq!(txid, tx.compute_txid());
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_first_broadcast_already_in_chain_is_rejected() {
    let tx = transaction(&[outpoint(5, 0)], &[2_000]);
    let server =
        MockServer::start(vec![MockResponse::json(400, "Transaction already in chain")]).await;
    let client = ExplorerClient::new(explorer_config(&server.url)).unwrap();

    let err = client.broadcast(&serialize_hex(&tx)).await.unwrap_err();
    assert!(matches!(
        err,
        ExplorerError::BroadcastRejected(BroadcastRejection::AlreadyInChain)
    ));
}

#[tokio::test]
async fn test_cache_capacity_bounds_fetched_transactions() {
    let first = transaction(&[outpoint(6, 0)], &[1_000]);
    let second = transaction(&[outpoint(7, 0)], &[1_000]);
    let server = MockServer::start(vec![
        MockResponse::json(200, serialize_hex(&first)),
        MockResponse::json(200, serialize_hex(&second)),
        MockResponse::json(200, serialize_hex(&first)),
    ])
    .await;
    let config = ExplorerConfig {
        cache_capacity: 1,
        ..explorer_config(&server.url)
    };
    let client = ExplorerClient::new(config).unwrap();

    let first_txid = first.compute_txid().to_string();
    client.get_raw_transaction(&first_txid).await.unwrap();
    client
        .get_raw_transaction(&second.compute_txid().to_string())
        .await
        .unwrap();
    assert_eq!(client.get_raw_transaction(&first_txid).await.unwrap(), serialize_hex(&first));
    assert_eq!(server.hits(), 3);
}
