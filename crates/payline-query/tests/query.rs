//! Query service behavior against a clearing-node stub.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use payline_auth::{install_handshake_hook, AuthedClient, SessionAuth, SessionClaims};
use payline_query::{LedgerTxFilter, QueryService};
use payline_rpc::{RpcConfig, RpcRequest, RpcResponse, RpcTransport};

async fn spawn_node(
    replies: HashMap<String, Value>,
) -> (String, mpsc::UnboundedReceiver<RpcRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let req = RpcRequest::decode(&text).unwrap();
                let _ = seen_tx.send(req.clone());
                let payload = match req.method.as_str() {
                    "auth_request" => json!({"challenge_message": "c"}),
                    "auth_verify" => json!({"success": true}),
                    method => replies.get(method).cloned().unwrap_or(Value::Null),
                };
                let frame = RpcResponse {
                    id: req.id,
                    method: req.method.clone(),
                    payload,
                    ts_ms: req.ts_ms,
                    sigs: vec![],
                    error: None,
                }
                .encode()
                .unwrap();
                let _ = ws.send(Message::Text(frame)).await;
            }
        }
    });
    (url, seen_rx)
}

async fn service(url: &str) -> QueryService {
    let transport = RpcTransport::new(RpcConfig {
        url: url.to_string(),
        max_reconnect_attempts: 2,
        initial_reconnect_delay_ms: 20,
        max_reconnect_delay_ms: 100,
        request_timeout_ms: 2_000,
    });
    let auth = Arc::new(SessionAuth::new(SessionClaims {
        wallet_address: "0x00000000000000000000000000000000000000aa".into(),
        application: "payline-test".into(),
        expires_in_secs: 3_600,
    }));
    install_handshake_hook(&transport, Arc::clone(&auth));
    transport.connect().await.unwrap();
    QueryService::new(AuthedClient::new(transport, auth))
}

#[tokio::test]
async fn null_ping_defaults_to_local_pong() {
    // "ping" is unscripted, so the stub answers null.
    let (url, mut seen) = spawn_node(HashMap::new()).await;
    let service = service(&url).await;

    let before = chrono::Utc::now().timestamp_millis();
    let pong = service.ping().await.unwrap();
    assert_eq!(pong.pong, "pong");
    assert!(pong.timestamp >= before);

    // ping is one of the public methods: no signature.
    let ping_req = loop {
        let req = seen.recv().await.unwrap();
        if req.method == "ping" {
            break req;
        }
    };
    assert!(ping_req.sigs.is_empty());
}

#[tokio::test]
async fn ledger_transactions_use_page_size_offset_convention() {
    let replies = HashMap::from([(
        "get_ledger_transactions".to_string(),
        json!({"ledger_transactions": [
            {"id": 1, "type": "transfer", "asset": "usdc", "amount": "5",
             "from": "0xaaa", "to": "0xbbb", "created_at": 1, "status": "confirmed"}
        ]}),
    )]);
    let (url, mut seen) = spawn_node(replies).await;
    let service = service(&url).await;

    let txs = service
        .get_ledger_transactions(&LedgerTxFilter {
            asset: Some("usdc".into()),
            tx_type: None,
            limit: Some(20),
            offset: Some(40),
        })
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].tx_type, "transfer");

    let req = loop {
        let req = seen.recv().await.unwrap();
        if req.method == "get_ledger_transactions" {
            break req;
        }
    };
    assert_eq!(req.params["page"]["size"], 20);
    assert_eq!(req.params["offset"], 40);
    assert_eq!(req.params["asset"], "usdc");
    assert!(!req.sigs.is_empty(), "ledger queries are signed");
}

#[tokio::test]
async fn get_app_session_merges_public_definition() {
    let replies = HashMap::from([
        (
            "get_app_sessions".to_string(),
            json!({"app_sessions": [
                {"app_session_id": "0xsess1", "status": "open", "version": 3,
                 "allocations": [{"participant": "0xaaa", "asset": "usdc", "amount": "70"}]}
            ]}),
        ),
        (
            "get_app_definition".to_string(),
            json!({"definition": {
                "protocol": "NitroRPC/0.4",
                "participants": ["0xaaa", "0xbbb"],
                "weights": [50, 50],
                "quorum": 100,
                "challenge": 3600,
                "nonce": 7
            }}),
        ),
    ]);
    let (url, mut seen) = spawn_node(replies).await;
    let service = service(&url).await;

    let session = service.get_app_session("0xsess1").await.unwrap();
    assert_eq!(session.status, "open");
    assert_eq!(session.version, 3);
    assert_eq!(
        session.participants.as_deref(),
        Some(&["0xaaa".to_string(), "0xbbb".to_string()][..])
    );
    assert_eq!(session.quorum, Some(100));

    // The definition read is public (unsigned).
    let def_req = loop {
        let req = seen.recv().await.unwrap();
        if req.method == "get_app_definition" {
            break req;
        }
    };
    assert!(def_req.sigs.is_empty());
}

#[tokio::test]
async fn missing_session_is_not_found() {
    let replies = HashMap::from([(
        "get_app_sessions".to_string(),
        json!({"app_sessions": []}),
    )]);
    let (url, _seen) = spawn_node(replies).await;
    let service = service(&url).await;

    let err = service.get_app_session("0xmissing").await.unwrap_err();
    assert_eq!(err.kind(), payline_core::ErrorKind::NotFound);
}
