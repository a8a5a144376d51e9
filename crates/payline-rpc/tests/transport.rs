//! Socket-level transport tests against an in-process websocket stub playing
//! the clearing node.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use payline_rpc::{
    LinkState, NotificationKind, RpcConfig, RpcRequest, RpcResponse, RpcTransport,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn test_config(url: &str) -> RpcConfig {
    RpcConfig {
        url: url.to_string(),
        max_reconnect_attempts: 5,
        initial_reconnect_delay_ms: 50,
        max_reconnect_delay_ms: 200,
        request_timeout_ms: 2_000,
    }
}

fn reply(req: &RpcRequest, payload: Value) -> Message {
    Message::Text(
        RpcResponse {
            id: req.id,
            method: req.method.clone(),
            payload,
            ts_ms: req.ts_ms,
            sigs: vec![],
            error: None,
        }
        .encode()
        .unwrap(),
    )
}

fn notification(method: &str, payload: Value) -> Message {
    Message::Text(
        RpcResponse {
            id: 0,
            method: method.to_string(),
            payload,
            ts_ms: 1,
            sigs: vec![],
            error: None,
        }
        .encode()
        .unwrap(),
    )
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// Echo server: answers every request with the given payload and records the
/// (id, method) of everything it sees.
fn spawn_echo(listener: TcpListener, payload: Value) -> mpsc::UnboundedReceiver<(u64, String)> {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let mut ws = accept_async(stream).await.unwrap();
            let seen_tx = seen_tx.clone();
            let payload = payload.clone();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let req = RpcRequest::decode(&text).unwrap();
                    let _ = seen_tx.send((req.id, req.method.clone()));
                    let _ = ws.send(reply(&req, payload.clone())).await;
                }
            }
        }
    });
    seen_rx
}

// ── Request / response ────────────────────────────────────────────────────────

#[tokio::test]
async fn request_resolves_with_server_payload() {
    let (listener, url) = bind().await;
    let _seen = spawn_echo(listener, json!({"pong": "pong"}));

    let transport = RpcTransport::new(test_config(&url));
    transport.connect().await.unwrap();
    // A second connect while live is a no-op.
    transport.connect().await.unwrap();

    let payload = transport.request("ping", json!({}), None).await.unwrap();
    assert_eq!(payload["pong"], "pong");
    assert_eq!(transport.state(), LinkState::Connected);
}

#[tokio::test]
async fn request_ids_are_strictly_increasing_from_one() {
    let (listener, url) = bind().await;
    let mut seen = spawn_echo(listener, json!({}));

    let transport = RpcTransport::new(test_config(&url));
    transport.connect().await.unwrap();
    for _ in 0..3 {
        transport.request("ping", json!({}), None).await.unwrap();
    }

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(seen.recv().await.unwrap().0);
    }
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn server_error_surfaces_as_typed_rpc_error() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let req = RpcRequest::decode(&text).unwrap();
            let frame = RpcResponse {
                id: req.id,
                method: req.method.clone(),
                payload: json!({}),
                ts_ms: req.ts_ms,
                sigs: vec![],
                error: Some(payline_rpc::RpcErrorBody {
                    code: -40,
                    message: "unsupported token".into(),
                }),
            }
            .encode()
            .unwrap();
            let _ = ws.send(Message::Text(frame)).await;
        }
    });

    let transport = RpcTransport::new(test_config(&url));
    transport.connect().await.unwrap();
    let err = transport
        .request("create_channel", json!({}), None)
        .await
        .unwrap_err();
    match err {
        payline_core::WalletError::Rpc { code, message, .. } => {
            assert_eq!(code, -40);
            assert_eq!(message, "unsupported token");
        }
        other => panic!("expected Rpc error, got {other}"),
    }
}

#[tokio::test]
async fn out_of_order_responses_correlate_by_id() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // Collect both requests, then answer them in reverse order.
        let mut reqs = Vec::new();
        while reqs.len() < 2 {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                reqs.push(RpcRequest::decode(&text).unwrap());
            }
        }
        for req in reqs.iter().rev() {
            let _ = ws.send(reply(req, json!({"echo": req.method}))).await;
        }
    });

    let transport = RpcTransport::new(test_config(&url));
    transport.connect().await.unwrap();
    let (a, b) = tokio::join!(
        transport.request("first", json!({}), None),
        transport.request("second", json!({}), None),
    );
    assert_eq!(a.unwrap()["echo"], "first");
    assert_eq!(b.unwrap()["echo"], "second");
}

#[tokio::test]
async fn timeout_fails_caller_without_dropping_connection() {
    let (listener, url) = bind().await;
    let transport = {
        let mut cfg = test_config(&url);
        cfg.request_timeout_ms = 150;
        RpcTransport::new(cfg)
    };
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // Swallow the first request, answer everything after it.
        let mut first = true;
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let req = RpcRequest::decode(&text).unwrap();
            if first {
                first = false;
                continue;
            }
            let _ = ws.send(reply(&req, json!({"late": false}))).await;
        }
    });

    transport.connect().await.unwrap();
    let err = transport.request("slow", json!({}), None).await.unwrap_err();
    assert!(matches!(err, payline_core::WalletError::Timeout(_)), "got {err}");
    // The connection survives and later requests work.
    let ok = transport.request("ping", json!({}), None).await.unwrap();
    assert_eq!(ok["late"], false);
}

// ── Notifications ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn notifications_dispatch_and_garbage_is_skipped() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // Garbage, an unknown method, a recognized notification, an asset
        // catalogue — then behave as an echo server.
        ws.send(Message::Text("definitely not json".into())).await.unwrap();
        ws.send(notification("xx", json!({}))).await.unwrap();
        ws.send(notification("bu", json!({"asset": "usdc", "amount": "5"})))
            .await
            .unwrap();
        ws.send(notification(
            "assets",
            json!([{"token": "0xa0b8", "chain_id": 8453, "symbol": "usdc", "decimals": 6}]),
        ))
        .await
        .unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let req = RpcRequest::decode(&text).unwrap();
            let _ = ws.send(reply(&req, json!({}))).await;
        }
    });

    let transport = RpcTransport::new(test_config(&url));
    let mut balance_updates = transport.subscribe(NotificationKind::BalanceUpdate, 8);
    transport.connect().await.unwrap();

    let note = tokio::time::timeout(Duration::from_secs(2), balance_updates.recv())
        .await
        .expect("notification within 2s")
        .expect("channel open");
    assert_eq!(note.kind, NotificationKind::BalanceUpdate);
    assert_eq!(note.payload["asset"], "usdc");

    // The catalogue was replaced and the link survived the garbage frame.
    wait_for(|| !transport.assets().is_empty()).await;
    let assets = transport.assets();
    assert_eq!(assets[0].symbol, "usdc");
    assert_eq!(assets[0].decimals, 6);
    transport.request("ping", json!({}), None).await.unwrap();
}

// ── Reconnection ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn dirty_close_reconnects_and_flushes_queued_request() {
    let (listener, url) = bind().await;
    tokio::spawn(async move {
        // First connection: accepted, then dropped without a close frame.
        let (s1, _) = listener.accept().await.unwrap();
        let ws1 = accept_async(s1).await.unwrap();
        drop(ws1);
        // Second connection serves normally.
        let (s2, _) = listener.accept().await.unwrap();
        let mut ws2 = accept_async(s2).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws2.next().await {
            let req = RpcRequest::decode(&text).unwrap();
            let _ = ws2.send(reply(&req, json!({"recovered": true}))).await;
        }
    });

    let transport = RpcTransport::new(test_config(&url));
    transport.connect().await.unwrap();
    // Wait until the transport has noticed the drop, so the request goes
    // through the offline queue rather than a live socket.
    wait_for(|| transport.state() != LinkState::Connected).await;

    let payload = transport
        .request("get_ledger_balances", json!({}), None)
        .await
        .unwrap();
    assert_eq!(payload["recovered"], true);
}

#[tokio::test]
async fn on_connect_hook_runs_before_queue_flush() {
    let (listener, url) = bind().await;
    let mut seen = spawn_echo(listener, json!({}));

    let transport = RpcTransport::new(test_config(&url));

    // Queue a request before the link exists.
    let early = {
        let t = transport.clone();
        tokio::spawn(async move { t.request("queued_call", json!({}), None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    transport.set_on_connect(Arc::new(|t: RpcTransport| {
        Box::pin(async move {
            t.request("handshake", json!({}), None).await.map(|_| ())
        })
    }));
    transport.connect().await.unwrap();
    early.await.unwrap().unwrap();

    let first = seen.recv().await.unwrap().1;
    let second = seen.recv().await.unwrap().1;
    assert_eq!(
        (first.as_str(), second.as_str()),
        ("handshake", "queued_call"),
        "handshake must precede queued replays"
    );
}

#[tokio::test]
async fn budget_exhaustion_fails_fast() {
    // Bind then drop to obtain an address nothing listens on.
    let (listener, url) = bind().await;
    drop(listener);

    let transport = RpcTransport::new(RpcConfig {
        url,
        max_reconnect_attempts: 2,
        initial_reconnect_delay_ms: 10,
        max_reconnect_delay_ms: 20,
        request_timeout_ms: 500,
    });
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, payline_core::WalletError::Unavailable(_)));
    assert_eq!(transport.state(), LinkState::Failed);

    let err = transport.request("ping", json!({}), None).await.unwrap_err();
    assert!(matches!(err, payline_core::WalletError::Unavailable(_)));
}

#[tokio::test]
async fn clean_close_does_not_reconnect() {
    let (listener, url) = bind().await;
    let (reconnected_tx, mut reconnected_rx) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "server going away".into(),
        })))
        .await
        .unwrap();
        // Any second accept is a reconnect the client must not attempt.
        if listener.accept().await.is_ok() {
            let _ = reconnected_tx.send(());
        }
    });

    let transport = RpcTransport::new(test_config(&url));
    transport.connect().await.unwrap();
    wait_for(|| transport.state() == LinkState::Disconnected).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        reconnected_rx.try_recv().is_err(),
        "client reconnected after a clean close"
    );
}
