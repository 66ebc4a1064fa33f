use serde::{Deserialize, Serialize};

use crate::model::{
    election::{Ballot, BallotBox, Mix},
    id::LedgerId,
};

/// Cast `ballot` in election `id`. The ballot's user is overwritten with the
/// caller's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cast {
    pub token: String,
    pub id: LedgerId,
    pub ballot: Ballot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastReply {
    /// Position of the ballot on the election chain.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBox {
    pub token: String,
    pub id: LedgerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBoxReply {
    #[serde(rename = "box")]
    pub ballot_box: BallotBox,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMixes {
    pub token: String,
    pub id: LedgerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMixesReply {
    pub mixes: Vec<Mix>,
}
