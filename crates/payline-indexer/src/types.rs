//! JSON:API response envelopes of the indexer, reduced to the fields the
//! aggregator consumes. Everything is `#[serde(default)]`-tolerant: a missing
//! `data` array or absent attribute degrades to empty rather than an error.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub data: Option<T>,
}

// ── Positions (portfolio) ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: PositionAttributes,
    #[serde(default)]
    pub relationships: Option<Relationships>,
}

impl Position {
    /// Chain the position lives on: the JSON:API relationship when present,
    /// otherwise the first implementation's chain id.
    pub fn chain_slug(&self) -> Option<&str> {
        if let Some(rel) = &self.relationships {
            if let Some(chain) = &rel.chain {
                if let Some(data) = &chain.data {
                    if !data.id.is_empty() {
                        return Some(&data.id);
                    }
                }
            }
        }
        self.attributes
            .fungible_info
            .as_ref()?
            .implementations
            .first()
            .map(|i| i.chain_id.as_str())
    }

    /// Token contract address of the first implementation; `None` marks the
    /// chain's native asset.
    pub fn implementation_address(&self) -> Option<&str> {
        self.attributes
            .fungible_info
            .as_ref()?
            .implementations
            .first()?
            .address
            .as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionAttributes {
    #[serde(default)]
    pub quantity: Quantity,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub fungible_info: Option<FungibleInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Quantity {
    /// Raw integer amount in smallest units, as a decimal string.
    #[serde(default)]
    pub int: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub numeric: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FungibleInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub implementations: Vec<Implementation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Implementation {
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationships {
    #[serde(default)]
    pub chain: Option<RelRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelRef {
    #[serde(default)]
    pub data: Option<RelData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelData {
    #[serde(default)]
    pub id: String,
}

// ── Transactions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: TxAttributes,
    #[serde(default)]
    pub relationships: Option<Relationships>,
}

impl TxEntry {
    pub fn chain_slug(&self) -> Option<&str> {
        let rel = self.relationships.as_ref()?;
        let data = rel.chain.as_ref()?.data.as_ref()?;
        (!data.id.is_empty()).then_some(data.id.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxAttributes {
    #[serde(default)]
    pub operation_type: Option<String>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub mined_at_block: Option<u64>,
    /// RFC 3339 timestamp string.
    #[serde(default)]
    pub mined_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_confirmations: Option<u64>,
    #[serde(default)]
    pub sent_from: Option<String>,
    #[serde(default)]
    pub sent_to: Option<String>,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transfer {
    #[serde(default)]
    pub fungible_info: Option<FungibleInfo>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub quantity: Option<Quantity>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
}
