//! Duplex RPC transport to the clearing node.
//!
//! One websocket connection, one dedicated reader task, writes serialized by
//! a mutex. Requests are correlated by a strictly monotonic id; anything
//! arriving with an unknown id is a notification and is dispatched to typed
//! subscribers through bounded channels so the read loop never blocks.

pub mod config;
pub mod transport;
pub mod wire;

pub use config::RpcConfig;
pub use transport::{LinkState, Notification, OnConnectHook, RequestSigner, RpcTransport};
pub use wire::{AssetInfo, NotificationKind, RpcErrorBody, RpcRequest, RpcResponse};
