//! Request and reply messages of the service's handler surface.
//!
//! Requests carrying a `token` are authorized through the session store.
//! Over HTTP the token travels in a cookie or header and the ledger ID in the
//! path, so only the remaining fields form the request body.

use serde::{Deserialize, Serialize};

pub use admin::{
    Decrypt, DecryptReply, Link, LinkReply, Open, OpenReply, OpenRequest, Shuffle, ShuffleReply,
};
pub use ballot::{Cast, CastReply, GetBox, GetBoxReply, GetMixes, GetMixesReply};
pub use login::{Login, LoginReply};

mod admin;
mod ballot;
mod login;

/// Liveness probe. The reply carries the nonce incremented by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub nonce: u32,
}
