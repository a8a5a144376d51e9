//! Two-party payment channels anchored in the on-chain custody contract.
//!
//! Every operation is a two-phase protocol: negotiate the signed state with
//! the clearing node off-chain, then submit it to the custody contract and
//! await one confirmation. The two phases never interleave across calls.

pub mod controller;
pub mod dto;
pub mod submitter;
pub mod types;

pub use controller::{ChannelController, OpenedChannel, SettledUpdate};
pub use submitter::{ContractSubmitter, CustodyRegistry, Receipt};
pub use types::{abi, Channel, ChannelState, Intent, StateAllocation};
