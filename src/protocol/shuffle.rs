//! Anonymizing mix of an election's frozen ballot box.
//!
//! The root re-encrypts every frozen ballot under the election key and
//! permutes the result. Any other node of the tree checks the mix against
//! its own view of the frozen box before acknowledging it. Once every node
//! has acknowledged, the root appends the [`Mix`], which ends casting.

use std::sync::Arc;

use rand::{rngs::OsRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::Ciphertext,
    error::Result,
    model::{
        chain::{store, Ledger, LedgerError},
        election::{BallotBox, Election, Mix},
    },
    overlay::{OverlayError, ProtocolInstance, TreeNodeInstance},
    protocol::{complete, finished, Done, Finished},
};

pub const NAME: &str = "shuffle";

#[derive(Serialize, Deserialize)]
enum Message {
    Mixed(Vec<Ciphertext>),
    Ack,
}

pub struct ShuffleProtocol {
    node: TreeNodeInstance,
    election: Election,
    ledger: Arc<dyn Ledger>,
    done: Done<Mix>,
}

impl ShuffleProtocol {
    pub fn new(
        node: TreeNodeInstance,
        election: Election,
        ledger: Arc<dyn Ledger>,
    ) -> (Self, Finished<Mix>) {
        let (done, finished) = finished();
        let protocol = Self {
            node,
            election,
            ledger,
            done,
        };
        (protocol, finished)
    }

    async fn frozen(&self) -> Result<BallotBox> {
        self.election
            .frozen_box(&*self.ledger)
            .await?
            .ok_or_else(|| {
                LedgerError::WrongRecord {
                    id: self.election.id,
                    expected: "a frozen box",
                }
                .into()
            })
    }

    async fn mix(&mut self) -> Result<Mix> {
        let frozen = self.frozen().await?;
        let mut ballots: Vec<_> = frozen
            .ballots
            .iter()
            .map(|ballot| ballot.ciphertext.reencrypt(&self.election.key))
            .collect();
        ballots.shuffle(&mut OsRng);

        self.node
            .send_to_children(&Message::Mixed(ballots.clone()))?;
        for _ in 0..self.node.children() {
            match self.node.receive().await? {
                (_, Message::Ack) => {}
                (from, _) => return Err(OverlayError::UnexpectedMessage(from).into()),
            }
        }

        let mix = Mix {
            ballots,
            node: self.node.identity().clone(),
        };
        store(&*self.ledger, &self.election.id, mix.clone()).await?;
        debug!(
            "Mixed {} ballots of election {}",
            mix.ballots.len(),
            self.election.id.short()
        );
        Ok(mix)
    }

    async fn verify(&mut self) -> Result<()> {
        let frozen = self.frozen().await?;
        match self.node.receive().await? {
            (_, Message::Mixed(ballots)) if ballots.len() == frozen.ballots.len() => {
                self.node.send_to_root(&Message::Ack)
            }
            (from, _) => Err(OverlayError::UnexpectedMessage(from).into()),
        }
    }
}

#[rocket::async_trait]
impl ProtocolInstance for ShuffleProtocol {
    fn node(&self) -> &TreeNodeInstance {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TreeNodeInstance {
        &mut self.node
    }

    async fn dispatch(mut self: Box<Self>) -> Result<()> {
        if self.node.is_root() {
            let outcome = self.mix().await;
            complete(&mut self.done, outcome)
        } else {
            self.verify().await
        }
    }
}
