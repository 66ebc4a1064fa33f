//! Joint decryption of an election's latest mix.
//!
//! Every node strips its key share off each mixed ballot and sends the
//! partial decryptions to the root. The root combines them with its own,
//! recovers one choice per ballot and records the [`Decryption`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    crypto::{recover_choice, Ciphertext, Point},
    error::{Error, Result},
    model::{
        chain::{store, Ledger, LedgerError},
        election::{Decryption, Election},
    },
    overlay::{OverlayError, ProtocolInstance, TreeNodeInstance},
    protocol::{complete, dkg::SharedSecret, finished, Done, Finished},
};

pub const NAME: &str = "decrypt";

#[derive(Serialize, Deserialize)]
struct Partials(Vec<Point>);

pub struct DecryptProtocol {
    node: TreeNodeInstance,
    election: Election,
    secret: SharedSecret,
    ledger: Arc<dyn Ledger>,
    done: Done<Decryption>,
}

impl DecryptProtocol {
    pub fn new(
        node: TreeNodeInstance,
        election: Election,
        secret: SharedSecret,
        ledger: Arc<dyn Ledger>,
    ) -> (Self, Finished<Decryption>) {
        let (done, finished) = finished();
        let protocol = Self {
            node,
            election,
            secret,
            ledger,
            done,
        };
        (protocol, finished)
    }

    async fn latest_mix(&self) -> Result<Vec<Ciphertext>> {
        let mix = self.election.mixes(&*self.ledger).await?.pop().ok_or(
            LedgerError::WrongRecord {
                id: self.election.id,
                expected: "a mix",
            },
        )?;
        Ok(mix.ballots)
    }

    fn partials(&self, ballots: &[Ciphertext]) -> Vec<Point> {
        ballots
            .iter()
            .map(|ballot| ballot.partial(&self.secret.v))
            .collect()
    }

    async fn combine(&mut self) -> Result<Decryption> {
        let ballots = self.latest_mix().await?;
        let mut partials = vec![self.partials(&ballots)];
        for _ in 0..self.node.children() {
            match self.node.receive().await? {
                (_, Partials(points)) if points.len() == ballots.len() => partials.push(points),
                (from, _) => return Err(OverlayError::UnexpectedMessage(from).into()),
            }
        }

        let choices = ballots
            .iter()
            .enumerate()
            .map(|(i, ballot)| {
                let message = ballot.combine(partials.iter().map(|node| &node[i]));
                recover_choice(&message).ok_or(Error::Undecryptable(i))
            })
            .collect::<Result<Vec<_>>>()?;

        let decryption = Decryption { choices };
        store(&*self.ledger, &self.election.id, decryption.clone()).await?;
        info!(
            "Decrypted {} ballots of election {}",
            decryption.choices.len(),
            self.election.id.short()
        );
        Ok(decryption)
    }
}

#[rocket::async_trait]
impl ProtocolInstance for DecryptProtocol {
    fn node(&self) -> &TreeNodeInstance {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TreeNodeInstance {
        &mut self.node
    }

    async fn dispatch(mut self: Box<Self>) -> Result<()> {
        if self.node.is_root() {
            let outcome = self.combine().await;
            complete(&mut self.done, outcome)
        } else {
            let ballots = self.latest_mix().await?;
            self.node.send_to_root(&Partials(self.partials(&ballots)))
        }
    }
}
