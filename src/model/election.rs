use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    crypto::{Ciphertext, Point},
    model::{
        chain::{Ledger, LedgerError, Record},
        id::LedgerId,
        User,
    },
    overlay::{Roster, ServerIdentity},
};

/// Position of an election in its lifecycle. Stages only move forward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum Stage {
    #[default]
    Running = 0,
    Shuffled = 1,
    Decrypted = 2,
}

impl Stage {
    /// The stage reached by an election chain holding `records`.
    pub fn of(records: &[Record]) -> Self {
        let mut stage = Self::Running;
        for record in records {
            match record {
                Record::Decryption(_) => return Self::Decrypted,
                Record::Mix(_) => stage = Self::Shuffled,
                _ => {}
            }
        }
        stage
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Shuffled => "shuffled",
            Self::Decrypted => "decrypted",
        };
        f.write_str(name)
    }
}

/// What an admin submits to open an election. The remaining fields of
/// [`Election`] are filled in once key generation completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub users: Vec<User>,
}

/// Header record of an election chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: LedgerId,
    pub master: LedgerId,
    pub name: String,
    pub description: String,
    pub creator: User,
    pub users: Vec<User>,
    pub roster: Roster,
    pub key: Point,
    /// Derived from the chain on every fetch, never trusted from storage.
    #[serde(default)]
    pub stage: Stage,
}

impl Election {
    pub fn new(
        draft: ElectionDraft,
        id: LedgerId,
        master: LedgerId,
        creator: User,
        roster: Roster,
        key: Point,
    ) -> Self {
        Self {
            id,
            master,
            name: draft.name,
            description: draft.description,
            creator,
            users: draft.users,
            roster,
            key,
            stage: Stage::Running,
        }
    }

    /// Is `user` allowed to take part, either as a listed voter or as the creator?
    pub fn is_user(&self, user: User) -> bool {
        self.users.contains(&user) || self.is_creator(user)
    }

    pub fn is_creator(&self, user: User) -> bool {
        self.creator == user
    }

    /// Every ballot cast so far, in append order.
    pub async fn ballot_box(&self, ledger: &dyn Ledger) -> Result<BallotBox, LedgerError> {
        Ok(cast_ballots(&ledger.records(&self.id).await?))
    }

    /// The box frozen by the latest shuffle request, if any.
    pub async fn frozen_box(&self, ledger: &dyn Ledger) -> Result<Option<BallotBox>, LedgerError> {
        Ok(frozen_box(&ledger.records(&self.id).await?).cloned())
    }

    /// Every shuffle output recorded so far, in append order.
    pub async fn mixes(&self, ledger: &dyn Ledger) -> Result<Vec<Mix>, LedgerError> {
        let records = ledger.records(&self.id).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                Record::Mix(mix) => Some(mix),
                _ => None,
            })
            .collect())
    }

    pub async fn decryption(&self, ledger: &dyn Ledger) -> Result<Option<Decryption>, LedgerError> {
        let records = ledger.records(&self.id).await?;
        Ok(records.into_iter().find_map(|record| match record {
            Record::Decryption(decryption) => Some(decryption),
            _ => None,
        }))
    }
}

pub(crate) fn cast_ballots(records: &[Record]) -> BallotBox {
    let ballots = records
        .iter()
        .filter_map(|record| match record {
            Record::Ballot(ballot) => Some(ballot.clone()),
            _ => None,
        })
        .collect();
    BallotBox { ballots }
}

pub(crate) fn frozen_box(records: &[Record]) -> Option<&BallotBox> {
    records.iter().rev().find_map(|record| match record {
        Record::Box(frozen) => Some(frozen),
        _ => None,
    })
}

pub(crate) fn latest_mix(records: &[Record]) -> Option<&Mix> {
    records.iter().rev().find_map(|record| match record {
        Record::Mix(mix) => Some(mix),
        _ => None,
    })
}

/// An encrypted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub user: User,
    pub ciphertext: Ciphertext,
}

/// A set of ballots, either as cast or frozen for shuffling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotBox {
    pub ballots: Vec<Ballot>,
}

/// Re-encrypted and permuted ballots, detached from their voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mix {
    pub ballots: Vec<Ciphertext>,
    /// The node that performed the mix.
    pub node: ServerIdentity,
}

/// Plaintext choices, one per ballot of the latest mix and in mix order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decryption {
    pub choices: Vec<u32>,
}

#[cfg(test)]
pub(crate) mod examples {
    use super::*;
    use crate::{
        crypto::{public, random_scalar},
        model::chain::store,
    };

    impl ElectionDraft {
        pub fn example(users: Vec<User>) -> Self {
            Self {
                name: "Board election".to_string(),
                description: "Annual election of the board".to_string(),
                users,
            }
        }
    }

    impl Election {
        pub fn example(id: LedgerId, roster: Roster, creator: User, users: Vec<User>) -> Self {
            Self::new(
                ElectionDraft::example(users),
                id,
                LedgerId::from([0; 32]),
                creator,
                roster,
                public(&random_scalar()),
            )
        }

        /// Create an election chain holding `ballots` ballots cast by its
        /// first listed voter.
        pub async fn seed(
            ledger: &dyn Ledger,
            roster: Roster,
            creator: User,
            users: Vec<User>,
            ballots: u32,
        ) -> Self {
            let id = ledger.create(&roster).await.unwrap();
            let election = Self::example(id, roster, creator, users);
            store(ledger, &id, election.clone()).await.unwrap();
            let voter = election.users.first().copied().unwrap_or(creator);
            for choice in 0..ballots {
                store(ledger, &id, Ballot::example(voter, &election.key, choice))
                    .await
                    .unwrap();
            }
            election
        }
    }

    impl Ballot {
        pub fn example(user: User, key: &Point, choice: u32) -> Self {
            Self {
                user,
                ciphertext: Ciphertext::encrypt(key, choice),
            }
        }
    }

    impl Mix {
        pub fn example(ballots: Vec<Ciphertext>) -> Self {
            Self {
                ballots,
                node: ServerIdentity::new("local://node0"),
            }
        }
    }
}
