//! IndexerClient behavior against a scripted in-process HTTP stub.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use payline_core::{ErrorKind, WalletError};
use payline_indexer::{IndexerClient, IndexerConfig};

/// Serves the scripted `(status, body)` responses one per connection and
/// records the request head (request line + headers) of each.
async fn spawn_http(responses: Vec<(u16, String)>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = seen_tx.send(String::from_utf8_lossy(&buf).to_string());

            let reason = match status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                502 => "Bad Gateway",
                _ => "Unknown",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (base_url, seen_rx)
}

fn fast_config(base_url: &str) -> IndexerConfig {
    let mut cfg = IndexerConfig::new(base_url, "demo");
    cfg.timeout = Duration::from_secs(2);
    cfg.retry_base_delay = Duration::from_millis(10);
    cfg
}

const PORTFOLIO_BODY: &str = r#"{
    "data": [{
        "id": "pos-1",
        "attributes": {
            "quantity": {"int": "1500000", "decimals": 6, "numeric": "1.5"},
            "fungible_info": {
                "name": "USD Coin",
                "symbol": "USDC",
                "implementations": [{"chain_id": "base", "address": "0xa0b8", "decimals": 6}]
            }
        },
        "relationships": {"chain": {"data": {"id": "base"}}}
    }]
}"#;

#[tokio::test]
async fn portfolio_parses_authenticates_and_caches() {
    let (base_url, mut seen) = spawn_http(vec![(200, PORTFOLIO_BODY.to_string())]).await;
    let client = IndexerClient::new(fast_config(&base_url));

    let positions = client.portfolio("0xABCD", Some("base")).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].attributes.quantity.int, "1500000");

    let head = seen.recv().await.unwrap();
    assert!(head.starts_with("GET /v1/wallets/0xABCD/portfolio?chain_ids=base"));
    // base64("demo:") — api key as username, empty password.
    assert!(head.contains("authorization: Basic ZGVtbzo=") || head.contains("Authorization: Basic ZGVtbzo="));

    // Second call is served from cache; the stub has no more scripted
    // responses, so a real request would fail.
    let cached = client.portfolio("0xabcd", Some("base")).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert!(seen.try_recv().is_err(), "cache hit must not hit the network");
}

#[tokio::test]
async fn client_error_surfaces_without_retry() {
    let (base_url, mut seen) =
        spawn_http(vec![(404, r#"{"errors":[{"title":"wallet not found"}]}"#.to_string())]).await;
    let client = IndexerClient::new(fast_config(&base_url));

    let err = client.portfolio("0xdead", None).await.unwrap_err();
    match err {
        WalletError::Indexer { status, .. } => assert_eq!(status, 404),
        other => panic!("expected Indexer error, got {other}"),
    }
    seen.recv().await.unwrap();
    assert!(seen.try_recv().is_err(), "4xx must not be retried");
}

#[tokio::test]
async fn server_errors_retry_then_succeed() {
    let (base_url, mut seen) = spawn_http(vec![
        (500, "{}".to_string()),
        (502, "{}".to_string()),
        (200, PORTFOLIO_BODY.to_string()),
    ])
    .await;
    let client = IndexerClient::new(fast_config(&base_url));

    let positions = client.portfolio("0xabcd", Some("base")).await.unwrap();
    assert_eq!(positions.len(), 1);

    let mut request_count = 0;
    while seen.try_recv().is_ok() {
        request_count += 1;
    }
    assert_eq!(request_count, 3);
}

#[tokio::test]
async fn exhausted_retries_surface_as_unavailable() {
    let (base_url, _seen) = spawn_http(vec![
        (500, "{}".to_string()),
        (500, "{}".to_string()),
        (500, "{}".to_string()),
    ])
    .await;
    let client = IndexerClient::new(fast_config(&base_url));

    let err = client.transactions("0xabcd", None, 50).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable, "got {err}");
}

#[tokio::test]
async fn missing_data_yields_empty_results() {
    let (base_url, _seen) = spawn_http(vec![(200, "{}".to_string())]).await;
    let client = IndexerClient::new(fast_config(&base_url));

    let positions = client.portfolio("0xempty", None).await.unwrap();
    assert!(positions.is_empty());
}
