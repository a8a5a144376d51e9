use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use payline_core::types::now_ms;
use payline_core::WalletError;

use crate::config::RpcConfig;
use crate::wire::{
    parse_asset_catalogue, AssetInfo, NotificationKind, RpcRequest, RpcResponse,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle. `Failed` is terminal: the reconnection budget was
/// exhausted and every further send fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// A server-pushed message that did not correlate with any pending request.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub method: String,
    pub payload: Value,
    pub ts_ms: i64,
}

/// Signs the canonical `req` tuple bytes; implemented by the session-auth
/// layer. `None` passed to [`RpcTransport::request`] sends unsigned.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    async fn sign(&self, canonical_req: &[u8]) -> Result<Vec<String>, WalletError>;
}

/// Runs after the socket opens and before the offline queue flushes, so the
/// auth handshake always precedes queued replays. Returning an error recycles
/// the connection through the normal reconnect path.
pub type OnConnectHook =
    Arc<dyn Fn(RpcTransport) -> BoxFuture<'static, Result<(), WalletError>> + Send + Sync>;

struct TransportInner {
    config: RpcConfig,
    state_tx: watch::Sender<LinkState>,
    state_rx: watch::Receiver<LinkState>,
    /// Monotonic request id, never reused within a process lifetime.
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, WalletError>>>>,
    /// Serialized frames waiting for a live socket, FIFO.
    queue: Mutex<VecDeque<String>>,
    /// The socket is not assumed multi-writer safe; all writes go through
    /// this mutex, held only for the duration of one frame write.
    writer: tokio::sync::Mutex<Option<WsSink>>,
    subscribers: Mutex<HashMap<NotificationKind, Vec<mpsc::Sender<Notification>>>>,
    /// Server-pushed asset catalogue. Replaced wholesale on each `assets`
    /// notification; persists across reconnects.
    assets: Mutex<Arc<Vec<AssetInfo>>>,
    on_connect: Mutex<Option<OnConnectHook>>,
    started: AtomicBool,
    shutdown: AtomicBool,
}

/// Handle to the single duplex clearing-node connection. Cheap to clone.
#[derive(Clone)]
pub struct RpcTransport {
    inner: Arc<TransportInner>,
}

impl RpcTransport {
    pub fn new(config: RpcConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        Self {
            inner: Arc::new(TransportInner {
                config,
                state_tx,
                state_rx,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                writer: tokio::sync::Mutex::new(None),
                subscribers: Mutex::new(HashMap::new()),
                assets: Mutex::new(Arc::new(Vec::new())),
                on_connect: Mutex::new(None),
                started: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.inner.state_rx.borrow()
    }

    /// Install the hook that runs on every (re)connect before the queue
    /// flush. Must be set before `connect`.
    pub fn set_on_connect(&self, hook: OnConnectHook) {
        *self.inner.on_connect.lock().unwrap() = Some(hook);
    }

    /// Current asset catalogue snapshot (empty until the server pushes one).
    pub fn assets(&self) -> Arc<Vec<AssetInfo>> {
        Arc::clone(&self.inner.assets.lock().unwrap())
    }

    /// Register for notifications of one kind. Dispatch uses `try_send`:
    /// a full buffer drops the notification for that subscriber rather than
    /// blocking the read loop.
    pub fn subscribe(&self, kind: NotificationKind, buffer: usize) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(buffer);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(tx);
        rx
    }

    /// Start the connection supervisor and wait until the link is up (or the
    /// reconnection budget is spent). Calling this again while the supervisor
    /// is live is a no-op.
    pub async fn connect(&self) -> Result<(), WalletError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(supervise(inner));

        let mut rx = self.inner.state_rx.clone();
        loop {
            match *rx.borrow() {
                LinkState::Connected => return Ok(()),
                LinkState::Failed => {
                    return Err(WalletError::Unavailable(
                        "reconnection budget exhausted".into(),
                    ))
                }
                LinkState::Disconnected if self.inner.shutdown.load(Ordering::SeqCst) => {
                    return Err(WalletError::Unavailable("transport closed".into()))
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(WalletError::Unavailable("transport task ended".into()));
            }
        }
    }

    /// Send a request and await its correlated response payload.
    ///
    /// The id is assigned here and never escapes to the caller. If the socket
    /// is down the frame is queued and flushed after the next successful
    /// (re)connect + handshake; the per-request timeout keeps running either
    /// way.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        signer: Option<&dyn RequestSigner>,
    ) -> Result<Value, WalletError> {
        if self.state() == LinkState::Failed {
            return Err(WalletError::Unavailable(format!(
                "not connected: {} is past its reconnection budget",
                self.inner.config.url
            )));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut req = RpcRequest {
            id,
            method: method.to_string(),
            params,
            ts_ms: now_ms(),
            sigs: Vec::new(),
        };
        if let Some(signer) = signer {
            let canonical = req.canonical_payload()?;
            req.sigs = signer.sign(&canonical).await?;
        }
        let frame = req.encode()?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().unwrap().insert(id, tx);

        if let Err(e) = self.write_or_enqueue(frame).await {
            self.inner.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        let timeout = Duration::from_millis(self.inner.config.request_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WalletError::Unavailable(
                "connection task dropped the request".into(),
            )),
            Err(_) => {
                self.inner.pending.lock().unwrap().remove(&id);
                Err(WalletError::Timeout(format!(
                    "{method} after {}ms",
                    self.inner.config.request_timeout_ms
                )))
            }
        }
    }

    /// Clean shutdown: close frame 1000, no reconnect.
    pub async fn close(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let mut writer = self.inner.writer.lock().await;
        if let Some(sink) = writer.as_mut() {
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client shutdown".into(),
                })))
                .await;
        }
    }

    async fn write_or_enqueue(&self, frame: String) -> Result<(), WalletError> {
        let mut writer = self.inner.writer.lock().await;
        match writer.as_mut() {
            Some(sink) if self.state() == LinkState::Connected => {
                sink.send(Message::Text(frame)).await.map_err(|e| {
                    WalletError::Unavailable(format!("socket write failed: {e}"))
                })
            }
            _ => {
                self.inner.queue.lock().unwrap().push_back(frame);
                debug!("link down; request queued");
                Ok(())
            }
        }
    }
}

// ── Connection supervisor ────────────────────────────────────────────────────

enum CloseKind {
    Clean,
    Dirty,
}

async fn supervise(inner: Arc<TransportInner>) {
    let mut attempt: u32 = 0;
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            set_state(&inner, LinkState::Disconnected);
            return;
        }
        set_state(&inner, LinkState::Connecting);

        match connect_async(inner.config.url.as_str()).await {
            Ok((ws, _)) => {
                let (sink, stream) = ws.split();
                *inner.writer.lock().await = Some(sink);
                attempt = 0;
                set_state(&inner, LinkState::Connected);
                info!(url = %inner.config.url, "clearing link established");

                // The hook exchanges frames, so the reader must already be
                // live; it gates only the queue flush. A failed handshake
                // closes the socket, which lands in the reconnect path below.
                let hook = inner.on_connect.lock().unwrap().clone();
                let handshake_then_flush = {
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        if let Some(hook) = hook {
                            let transport = RpcTransport { inner: Arc::clone(&inner) };
                            if let Err(e) = hook(transport).await {
                                warn!(error = %e, "on-connect hook failed; recycling connection");
                                let mut writer = inner.writer.lock().await;
                                if let Some(sink) = writer.as_mut() {
                                    let _ = sink
                                        .send(Message::Close(Some(CloseFrame {
                                            code: CloseCode::Policy,
                                            reason: "handshake failed".into(),
                                        })))
                                        .await;
                                }
                                *writer = None;
                                return;
                            }
                        }
                        flush_queue(&inner).await;
                    })
                };

                let close = read_loop(&inner, stream).await;
                handshake_then_flush.abort();
                *inner.writer.lock().await = None;

                if inner.shutdown.load(Ordering::SeqCst) || matches!(close, CloseKind::Clean) {
                    inner.shutdown.store(true, Ordering::SeqCst);
                    set_state(&inner, LinkState::Disconnected);
                    info!("clearing link closed cleanly");
                    return;
                }
            }
            Err(e) => {
                warn!(url = %inner.config.url, error = %e, "connect failed");
            }
        }

        attempt += 1;
        if attempt > inner.config.max_reconnect_attempts {
            warn!(
                attempts = attempt - 1,
                "reconnection budget exhausted; link failed"
            );
            set_state(&inner, LinkState::Failed);
            fail_pending(&inner, "connection lost past reconnection budget");
            return;
        }
        let delay = inner.config.reconnect_delay_ms(attempt);
        set_state(&inner, LinkState::Reconnecting);
        info!(attempt, delay_ms = delay, "reconnect scheduled");
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

fn set_state(inner: &TransportInner, state: LinkState) {
    inner.state_tx.send_replace(state);
}

fn fail_pending(inner: &TransportInner, reason: &str) {
    let drained: Vec<_> = inner.pending.lock().unwrap().drain().collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(WalletError::Unavailable(reason.to_string())));
    }
}

/// Flush queued frames FIFO. A failed write re-prepends the frame and stops;
/// it will be retried after the next reconnect.
async fn flush_queue(inner: &Arc<TransportInner>) {
    loop {
        let frame = match inner.queue.lock().unwrap().pop_front() {
            Some(f) => f,
            None => return,
        };
        let mut writer = inner.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            inner.queue.lock().unwrap().push_front(frame);
            return;
        };
        if let Err(e) = sink.send(Message::Text(frame.clone())).await {
            warn!(error = %e, "flush write failed; frame requeued");
            inner.queue.lock().unwrap().push_front(frame);
            return;
        }
    }
}

/// The single reader task. Returns how the connection ended.
async fn read_loop(inner: &Arc<TransportInner>, mut stream: WsSource) -> CloseKind {
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => handle_frame(inner, &text),
            Ok(Message::Close(frame)) => {
                let code = frame.map(|f| u16::from(f.code)).unwrap_or(1006);
                debug!(code, "close frame received");
                return if code == 1000 { CloseKind::Clean } else { CloseKind::Dirty };
            }
            // Ping/pong are answered by the protocol layer; binary frames are
            // not part of this protocol.
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "socket error on read");
                return CloseKind::Dirty;
            }
        }
    }
    CloseKind::Dirty
}

/// Correlate one inbound frame. Parse failures are logged and skipped — a
/// garbled frame must not take the connection down.
fn handle_frame(inner: &Arc<TransportInner>, text: &str) {
    let resp = match RpcResponse::decode(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "unparseable inbound frame skipped");
            return;
        }
    };

    let resolver = inner.pending.lock().unwrap().remove(&resp.id);
    match resolver {
        Some(tx) => {
            let result = match resp.error {
                Some(err) => Err(WalletError::Rpc {
                    method: resp.method,
                    code: err.code,
                    message: err.message,
                }),
                None => Ok(resp.payload),
            };
            let _ = tx.send(result);
        }
        None => dispatch_notification(inner, resp),
    }
}

fn dispatch_notification(inner: &Arc<TransportInner>, resp: RpcResponse) {
    let Some(kind) = NotificationKind::from_method(&resp.method) else {
        debug!(method = %resp.method, "unknown notification discarded");
        return;
    };

    if kind == NotificationKind::Assets {
        match parse_asset_catalogue(&resp.payload) {
            Some(catalogue) => {
                debug!(count = catalogue.len(), "asset catalogue replaced");
                *inner.assets.lock().unwrap() = Arc::new(catalogue);
            }
            None => warn!("assets notification with unparseable payload"),
        }
    }

    let note = Notification {
        kind,
        method: resp.method,
        payload: resp.payload,
        ts_ms: resp.ts_ms,
    };
    let subscribers = inner.subscribers.lock().unwrap();
    if let Some(list) = subscribers.get(&kind) {
        for tx in list {
            if tx.try_send(note.clone()).is_err() {
                warn!(kind = note.method.as_str(), "subscriber lagging; notification dropped");
            }
        }
    }
}
