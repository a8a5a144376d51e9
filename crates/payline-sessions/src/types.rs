use serde::{Deserialize, Serialize};

/// The immutable definition an app session is created with. Weighted
/// signatures meeting `quorum` authorize every state update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDefinition {
    pub protocol: String,
    pub participants: Vec<String>,
    pub weights: Vec<u64>,
    pub quorum: u64,
    pub challenge: u64,
    pub nonce: u64,
}

impl AppDefinition {
    pub fn total_weight(&self) -> u64 {
        self.weights.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// Mutation intents sent with `operate_app_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIntent {
    Deposit,
    Operate,
}

impl SessionIntent {
    pub fn wire_name(&self) -> &'static str {
        match self {
            SessionIntent::Deposit => "DEPOSIT",
            SessionIntent::Operate => "OPERATE",
        }
    }
}

/// Local bookkeeping status of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Invited,
    Joined,
    Left,
}
