//! Shared vocabulary for the Payline wallet backend: chain registry, id
//! newtypes, amount arithmetic, error kinds, and workspace-wide constants.

pub mod chains;
pub mod constants;
pub mod error;
pub mod types;
pub mod units;

pub use chains::{Chain, ChainFamily};
pub use error::{ErrorKind, WalletError};
pub use types::{AppSessionId, Asset, ChannelId, TimestampMs, UserId};
