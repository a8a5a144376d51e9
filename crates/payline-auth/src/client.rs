use std::sync::Arc;

use serde_json::Value;

use payline_core::WalletError;
use payline_rpc::{OnConnectHook, RpcTransport};

use crate::SessionAuth;

/// Methods the clearing node accepts without a session signature.
pub const PUBLIC_METHODS: &[&str] = &[
    "ping",
    "get_app_definition",
    "get_assets",
    "auth_request",
    "auth_verify",
];

/// Transport + session-auth pairing used by every controller. Signs all
/// requests except the public methods.
#[derive(Clone)]
pub struct AuthedClient {
    transport: RpcTransport,
    auth: Arc<SessionAuth>,
}

impl AuthedClient {
    pub fn new(transport: RpcTransport, auth: Arc<SessionAuth>) -> Self {
        Self { transport, auth }
    }

    pub fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    pub fn auth(&self) -> &SessionAuth {
        &self.auth
    }

    /// Signed call (public methods are sent unsigned automatically).
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        if PUBLIC_METHODS.contains(&method) {
            self.transport.request(method, params, None).await
        } else {
            self.transport
                .request(method, params, Some(self.auth.as_ref()))
                .await
        }
    }

    /// Explicitly unsigned call.
    pub async fn call_public(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        self.transport.request(method, params, None).await
    }
}

/// Wire the handshake into the transport's on-connect hook so that every
/// (re)connect re-authenticates before the offline queue flushes.
pub fn install_handshake_hook(transport: &RpcTransport, auth: Arc<SessionAuth>) {
    let hook: OnConnectHook = Arc::new(move |t: RpcTransport| {
        let auth = Arc::clone(&auth);
        Box::pin(async move { auth.handshake(&t).await })
    });
    transport.set_on_connect(hook);
}
