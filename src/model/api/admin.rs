use serde::{Deserialize, Serialize};

use crate::{
    crypto::Point,
    model::{election::ElectionDraft, id::LedgerId, User},
    overlay::Roster,
};

/// Register a new master chain. Authenticated by the node's pin rather than
/// a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub pin: String,
    pub key: Point,
    pub roster: Roster,
    pub admins: Vec<User>,
}

/// Empty when the request carried no pin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReply {
    pub master: Option<LedgerId>,
}

/// Body of an open request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub master: LedgerId,
    pub election: ElectionDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Open {
    pub token: String,
    pub master: LedgerId,
    pub election: ElectionDraft,
}

impl Open {
    pub fn new(token: impl Into<String>, request: OpenRequest) -> Self {
        Self {
            token: token.into(),
            master: request.master,
            election: request.election,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReply {
    pub id: LedgerId,
    pub key: Point,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shuffle {
    pub token: String,
    pub id: LedgerId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleReply {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypt {
    pub token: String,
    pub id: LedgerId,
}

/// One recovered choice per ballot of the latest mix, in mix order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptReply {
    pub choices: Vec<u32>,
}
