//! App-session lifecycle against a clearing-node stub: create & fund, move
//! balances under conservation, close idempotently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use payline_auth::{install_handshake_hook, AuthedClient, SessionAuth, SessionClaims};
use payline_core::{AppSessionId, Asset, Chain, ErrorKind};
use payline_rpc::{RpcConfig, RpcRequest, RpcResponse, RpcTransport};
use payline_sessions::{
    AppSessionController, AssetCatalog, CreateSessionParams, MemorySessionStore,
    ParticipantStatus, SessionStatus, SessionStore,
};

const ALICE: &str = "0x00000000000000000000000000000000000000Aa";
const BOB: &str = "0x00000000000000000000000000000000000000Bb";

struct UsdcCatalog;

impl AssetCatalog for UsdcCatalog {
    fn decimals(&self, asset: &Asset, _chain: Chain) -> Option<u8> {
        (asset.as_str() == "usdc").then_some(6)
    }
}

/// Stub node: serves the handshake, assigns session ids, and bumps a version
/// counter per mutation.
async fn spawn_node() -> (String, mpsc::UnboundedReceiver<RpcRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let version = Arc::new(AtomicU64::new(1));

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
                    "create_app_session" => {
                        json!({"app_session_id": "0xsess1", "version": 1, "status": "open"})
                    }
                    "operate_app_session" => {
                        let v = version.fetch_add(1, Ordering::SeqCst) + 1;
                        json!({"app_session_id": "0xsess1", "version": v})
                    }
                    "close_app_session" => json!({"app_session_id": "0xsess1", "status": "closed"}),
                    _ => json!({}),
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

async fn controller(
    url: &str,
    store: Arc<MemorySessionStore>,
) -> AppSessionController {
    let transport = RpcTransport::new(RpcConfig {
        url: url.to_string(),
        max_reconnect_attempts: 2,
        initial_reconnect_delay_ms: 20,
        max_reconnect_delay_ms: 100,
        request_timeout_ms: 2_000,
    });
    let auth = Arc::new(SessionAuth::new(SessionClaims {
        wallet_address: ALICE.into(),
        application: "payline-test".into(),
        expires_in_secs: 3_600,
    }));
    install_handshake_hook(&transport, Arc::clone(&auth));
    transport.connect().await.unwrap();
    let client = AuthedClient::new(transport, auth);
    AppSessionController::new(client, store, Arc::new(UsdcCatalog), None)
}

fn create_params() -> CreateSessionParams {
    CreateSessionParams {
        participants: vec![ALICE.into(), BOB.into()],
        weights: vec![50, 50],
        quorum: 100,
        asset: Asset::new("usdc"),
        chain: Chain::Base,
        initial_allocations: HashMap::from([(ALICE.to_string(), "100.0".to_string())]),
        protocol: None,
        challenge: None,
    }
}

async fn balances(store: &MemorySessionStore, id: &AppSessionId) -> HashMap<String, u128> {
    store
        .participants(id)
        .await
        .unwrap()
        .into_iter()
        .map(|row| (row.address.to_lowercase(), row.balance))
        .collect()
}

#[tokio::test]
async fn lifecycle_create_fund_transfer_close() {
    let (url, mut seen) = spawn_node().await;
    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(&url, Arc::clone(&store)).await;

    // Create with Alice funding 100 usdc.
    let created = controller.create(create_params()).await.unwrap();
    assert_eq!(created.id.as_str(), "0xsess1");
    assert_eq!(created.participants.len(), 2);
    for row in &created.participants {
        assert_eq!(row.status, ParticipantStatus::Invited);
    }
    let start = balances(&store, &created.id).await;
    assert_eq!(start[&ALICE.to_lowercase()], 100_000_000);
    assert_eq!(start[&BOB.to_lowercase()], 0);

    // The create request carried the definition defaults and allocations.
    let create_req = loop {
        let req = seen.recv().await.unwrap();
        if req.method == "create_app_session" {
            break req;
        }
    };
    assert!(!create_req.sigs.is_empty());
    assert_eq!(create_req.params["definition"]["protocol"], "NitroRPC/0.4");
    assert_eq!(create_req.params["definition"]["challenge"], 3600);
    assert_eq!(create_req.params["allocations"][0]["amount"], "100");

    // Bob deposits 50.
    let bob_balance = controller
        .deposit(&created.id, BOB, "50.0", &Asset::new("usdc"))
        .await
        .unwrap();
    assert_eq!(bob_balance, 50_000_000);
    let bob_row = store
        .participant(&created.id, BOB, &Asset::new("usdc"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob_row.status, ParticipantStatus::Joined);

    let deposit_req = loop {
        let req = seen.recv().await.unwrap();
        if req.method == "operate_app_session" {
            break req;
        }
    };
    assert_eq!(deposit_req.params["intent"], "DEPOSIT");

    // Alice pays Bob 30.
    let (alice_new, bob_new) = controller
        .transfer(&created.id, ALICE, BOB, "30.0", &Asset::new("usdc"))
        .await
        .unwrap();
    assert_eq!(alice_new, 70_000_000);
    assert_eq!(bob_new, 80_000_000);

    // Conservation: the per-asset sum is unchanged by OPERATE.
    let after = balances(&store, &created.id).await;
    assert_eq!(after.values().sum::<u128>(), 150_000_000);

    let transfer_req = loop {
        let req = seen.recv().await.unwrap();
        if req.method == "operate_app_session" {
            break req;
        }
    };
    assert_eq!(transfer_req.params["intent"], "OPERATE");

    // Close.
    let closed = controller.close(&created.id).await.unwrap();
    assert_eq!(closed.status, SessionStatus::Closed);
    assert!(closed.closed_at.is_some());
}

#[tokio::test]
async fn transfer_beyond_balance_is_a_precondition_failure() {
    let (url, _seen) = spawn_node().await;
    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(&url, Arc::clone(&store)).await;
    let created = controller.create(create_params()).await.unwrap();

    let err = controller
        .transfer(&created.id, ALICE, BOB, "200.0", &Asset::new("usdc"))
        .await
        .unwrap_err();
    match err {
        payline_core::WalletError::InsufficientBalance { available, requested, ref source_label } => {
            assert_eq!(available, 100_000_000);
            assert_eq!(requested, 200_000_000);
            assert_eq!(source_label, "session-ledger");
        }
        other => panic!("expected InsufficientBalance, got {other}"),
    }

    // Balances untouched.
    let unchanged = balances(&store, &created.id).await;
    assert_eq!(unchanged[&ALICE.to_lowercase()], 100_000_000);
}

#[tokio::test]
async fn unfunded_invitee_cannot_send() {
    let (url, _seen) = spawn_node().await;
    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(&url, Arc::clone(&store)).await;
    let created = controller.create(create_params()).await.unwrap();

    // Bob is invited with zero balance: receiving is fine, sending is not.
    let err = controller
        .transfer(&created.id, BOB, ALICE, "1.0", &Asset::new("usdc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert!(err.to_string().contains("not joined"));
}

#[tokio::test]
async fn close_is_idempotent_without_a_second_rpc() {
    let (url, mut seen) = spawn_node().await;
    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(&url, Arc::clone(&store)).await;
    let created = controller.create(create_params()).await.unwrap();

    let first = controller.close(&created.id).await.unwrap();
    let second = controller.close(&created.id).await.unwrap();
    assert_eq!(first.status, SessionStatus::Closed);
    assert_eq!(second.status, SessionStatus::Closed);
    assert_eq!(first.closed_at, second.closed_at);

    let close_count = {
        let mut n = 0;
        while let Ok(req) = seen.try_recv() {
            if req.method == "close_app_session" {
                n += 1;
            }
        }
        n
    };
    assert_eq!(close_count, 1, "second close must not hit the node");
}

#[tokio::test]
async fn mutations_on_closed_session_are_rejected() {
    let (url, _seen) = spawn_node().await;
    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(&url, Arc::clone(&store)).await;
    let created = controller.create(create_params()).await.unwrap();
    controller.close(&created.id).await.unwrap();

    let err = controller
        .deposit(&created.id, BOB, "1.0", &Asset::new("usdc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert!(err.to_string().contains("already closed"));
}

#[tokio::test]
async fn store_failure_after_accepted_mutation_is_a_desync_not_an_error() {
    let (url, _seen) = spawn_node().await;
    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(&url, Arc::clone(&store)).await;
    let created = controller.create(create_params()).await.unwrap();

    store.fail_next_write();
    // The node accepted the deposit, so the call succeeds; the local ledger
    // is stale until reconciliation.
    let new_balance = controller
        .deposit(&created.id, BOB, "50.0", &Asset::new("usdc"))
        .await
        .unwrap();
    assert_eq!(new_balance, 50_000_000);

    let local = balances(&store, &created.id).await;
    assert_eq!(local[&BOB.to_lowercase()], 0, "local write failed by design");
}

#[tokio::test]
async fn unknown_asset_is_rejected_before_any_rpc() {
    let (url, mut seen) = spawn_node().await;
    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(&url, Arc::clone(&store)).await;

    let mut params = create_params();
    params.asset = Asset::new("doge");
    let err = controller.create(params).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    let mut methods = Vec::new();
    while let Ok(req) = seen.try_recv() {
        methods.push(req.method);
    }
    assert!(!methods.contains(&"create_app_session".to_string()));
}
