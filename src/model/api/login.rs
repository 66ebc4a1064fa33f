use serde::{Deserialize, Serialize};

use crate::model::{election::Election, id::LedgerId, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub master: LedgerId,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReply {
    pub token: String,
    pub admin: bool,
    /// Elections under the master in which the user is creator or voter.
    pub elections: Vec<Election>,
}
