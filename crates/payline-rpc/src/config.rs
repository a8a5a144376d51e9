use payline_core::constants::{
    DEFAULT_INITIAL_RECONNECT_DELAY_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_MAX_RECONNECT_DELAY_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};

/// Transport configuration. `url` is the clearing node's websocket endpoint;
/// everything else tunes reconnection and request timeouts.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_reconnect_delay_ms: DEFAULT_INITIAL_RECONNECT_DELAY_MS,
            max_reconnect_delay_ms: DEFAULT_MAX_RECONNECT_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    /// Backoff before reconnect attempt `n` (1-based):
    /// `min(initial * 2^(n-1), max)`.
    pub fn reconnect_delay_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_reconnect_delay_ms
            .saturating_mul(1u64 << shift);
        delay.min(self.max_reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = RpcConfig::new("ws://example");
        assert_eq!(cfg.reconnect_delay_ms(1), 1_000);
        assert_eq!(cfg.reconnect_delay_ms(2), 2_000);
        assert_eq!(cfg.reconnect_delay_ms(3), 4_000);
        assert_eq!(cfg.reconnect_delay_ms(5), 16_000);
        // Capped at max_reconnect_delay_ms from attempt 6 on.
        assert_eq!(cfg.reconnect_delay_ms(6), 30_000);
        assert_eq!(cfg.reconnect_delay_ms(30), 30_000);
    }
}
