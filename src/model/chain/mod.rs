//! Append-only ledgers ("chains"), one per master registry and one per
//! election. Consensus and replication live behind the [`Ledger`] trait.

use rocket::serde::json::serde_json::Error as JsonError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    model::{
        election::{Ballot, BallotBox, Decryption, Election, Mix, Stage},
        id::LedgerId,
        master::{Link, Master},
    },
    overlay::Roster,
};

mod memory;

pub use memory::MemoryLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Unknown ledger {0}")]
    UnknownLedger(LedgerId),
    #[error("Ledger {id} does not hold {expected} record")]
    WrongRecord { id: LedgerId, expected: &'static str },
    #[error("Record rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Marshal(#[from] JsonError),
}

/// First record of every ledger. Its digest is the ledger's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub roster: Roster,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Record {
    Genesis(Genesis),
    Master(Master),
    Link(Link),
    Election(Election),
    Ballot(Ballot),
    Box(BallotBox),
    Mix(Mix),
    Decryption(Decryption),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Genesis(_) => "genesis",
            Self::Master(_) => "master",
            Self::Link(_) => "link",
            Self::Election(_) => "election",
            Self::Ballot(_) => "ballot",
            Self::Box(_) => "box",
            Self::Mix(_) => "mix",
            Self::Decryption(_) => "decryption",
        }
    }
}

macro_rules! into_record {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Record {
                fn from(record: $ty) -> Self {
                    Self::$variant(record)
                }
            }
        )*
    };
}

into_record! {
    Master => Master,
    Link => Link,
    Election => Election,
    Ballot => Ballot,
    BallotBox => Box,
    Mix => Mix,
    Decryption => Decryption,
}

/// A replicated, append-only store of ledgers.
#[rocket::async_trait]
pub trait Ledger: Send + Sync {
    /// Create a new ledger replicated over `roster`.
    async fn create(&self, roster: &Roster) -> Result<LedgerId, LedgerError>;

    /// Append a record, returning its index once confirmed.
    async fn append(&self, id: &LedgerId, record: Record) -> Result<usize, LedgerError>;

    /// Every record of the ledger, genesis first.
    async fn records(&self, id: &LedgerId) -> Result<Vec<Record>, LedgerError>;
}

/// Append anything that converts into a [`Record`].
pub async fn store<R>(ledger: &dyn Ledger, id: &LedgerId, record: R) -> Result<usize, LedgerError>
where
    R: Into<Record> + Send,
{
    ledger.append(id, record.into()).await
}

/// Fetch the master registry held by ledger `id`.
pub async fn fetch_master(ledger: &dyn Ledger, id: &LedgerId) -> Result<Master, LedgerError> {
    match ledger.records(id).await?.get(1) {
        Some(Record::Master(master)) => Ok(master.clone()),
        _ => Err(LedgerError::WrongRecord {
            id: *id,
            expected: "a master",
        }),
    }
}

/// Fetch the election held by ledger `id`, with its stage derived from the
/// ledger's history.
pub async fn fetch_election(ledger: &dyn Ledger, id: &LedgerId) -> Result<Election, LedgerError> {
    let records = ledger.records(id).await?;
    match records.get(1) {
        Some(Record::Election(election)) => Ok(Election {
            stage: Stage::of(&records),
            ..election.clone()
        }),
        _ => Err(LedgerError::WrongRecord {
            id: *id,
            expected: "an election",
        }),
    }
}
