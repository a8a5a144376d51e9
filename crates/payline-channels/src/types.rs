use alloy_primitives::{keccak256, Address, Bytes, FixedBytes, U256};
use alloy_sol_types::SolValue;

use payline_core::ChannelId;

/// Custody-contract ABI subset. The channel id commits to the ABI encoding of
/// the channel tuple; states are encoded as the `State` struct below.
pub mod abi {
    use alloy_sol_types::sol;

    sol! {
        struct Allocation {
            uint256 index;
            uint256 amount;
        }

        struct State {
            uint8 intent;
            uint64 version;
            bytes data;
            Allocation[] allocations;
        }

        function create(bytes32 channelId, State state, bytes[] sigs);
        function resize(bytes32 channelId, State state, bytes[] sigs);
        function close(bytes32 channelId, State state, bytes[] sigs);
    }
}

// ── Channel tuple ────────────────────────────────────────────────────────────

/// The immutable channel definition. `id()` is a pure function of this tuple:
/// equal tuples always give equal ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub participants: [Address; 2],
    pub adjudicator: Address,
    pub challenge: U256,
    pub nonce: U256,
}

impl Channel {
    /// `keccak256(abi.encode(participants, adjudicator, challenge, nonce))`.
    pub fn id(&self) -> ChannelId {
        let encoded =
            (self.participants, self.adjudicator, self.challenge, self.nonce).abi_encode();
        ChannelId::from_bytes(keccak256(&encoded).0)
    }
}

// ── Channel state ────────────────────────────────────────────────────────────

/// Role of a state in the channel protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Intent {
    Initialize = 0,
    Operate = 1,
    Resize = 2,
    Finalize = 3,
}

impl Intent {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Initialize),
            1 => Some(Self::Operate),
            2 => Some(Self::Resize),
            3 => Some(Self::Finalize),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INITIALIZE" => Some(Self::Initialize),
            "OPERATE" => Some(Self::Operate),
            "RESIZE" => Some(Self::Resize),
            "FINALIZE" => Some(Self::Finalize),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateAllocation {
    pub index: U256,
    pub amount: U256,
}

/// One channel state as signed by both parties. `version` strictly increases
/// per channel; `Initialize` is always version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub intent: Intent,
    pub version: u64,
    pub data: Bytes,
    pub allocations: Vec<StateAllocation>,
}

impl ChannelState {
    /// The version-0 state a fresh channel is created with: the caller's
    /// deposit at index 0, nothing at index 1.
    pub fn initial(deposit: U256) -> Self {
        Self {
            intent: Intent::Initialize,
            version: 0,
            data: Bytes::new(),
            allocations: vec![
                StateAllocation { index: U256::ZERO, amount: deposit },
                StateAllocation { index: U256::from(1u8), amount: U256::ZERO },
            ],
        }
    }

    pub fn to_sol(&self) -> abi::State {
        abi::State {
            intent: self.intent.as_u8(),
            version: self.version,
            data: self.data.clone(),
            allocations: self
                .allocations
                .iter()
                .map(|a| abi::Allocation { index: a.index, amount: a.amount })
                .collect(),
        }
    }

    /// ABI encoding of the `State` struct, as the custody contract hashes it.
    pub fn abi_encode(&self) -> Vec<u8> {
        self.to_sol().abi_encode()
    }
}

/// Helper for building calldata arguments.
pub fn channel_id_word(id: &ChannelId) -> FixedBytes<32> {
    FixedBytes(*id.as_bytes())
}
