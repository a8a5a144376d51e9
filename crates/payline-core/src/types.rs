use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in milliseconds, UTC. The clearing-node wire format carries
/// millisecond timestamps in both request and response envelopes.
pub type TimestampMs = i64;

// ── UserId ───────────────────────────────────────────────────────────────────

/// Opaque user identifier assigned by the API layer above the core.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

// ── AppSessionId ─────────────────────────────────────────────────────────────

/// Opaque identifier of an N-party off-chain app session, assigned by the
/// clearing node on `create_app_session`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppSessionId(pub String);

impl AppSessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AppSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = if self.0.len() > 10 { &self.0[..10] } else { &self.0 };
        write!(f, "AppSessionId({short}…)")
    }
}

// ── ChannelId ────────────────────────────────────────────────────────────────

/// 32-byte payment-channel identifier: keccak256 of the ABI-encoded channel
/// tuple `(participants, adjudicator, challenge, nonce)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub [u8; 32]);

impl ChannelId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed hex string representation.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({}…)", &self.to_hex()[..12])
    }
}

// ── Asset ────────────────────────────────────────────────────────────────────

/// Asset symbol as known to the clearing node (`usdc`, `weth`, …).
/// Normalized to lowercase on construction so lookups are case-insensitive.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Asset(String);

impl Asset {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset({})", self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Current wall-clock time in milliseconds, UTC.
pub fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_hex_round_trip() {
        let id = ChannelId::from_bytes([0xab; 32]);
        let hex = id.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(ChannelId::from_hex(&hex).unwrap(), id);
        // Unprefixed input is accepted too.
        assert_eq!(ChannelId::from_hex(&hex[2..]).unwrap(), id);
    }

    #[test]
    fn channel_id_rejects_wrong_length() {
        assert!(ChannelId::from_hex("0xabcd").is_err());
    }

    #[test]
    fn asset_is_case_insensitive() {
        assert_eq!(Asset::new("USDC"), Asset::new("usdc"));
    }
}
