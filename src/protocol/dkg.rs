//! Additive n-of-n distributed key generation over a star.
//!
//! Each node draws a secret share `v_i` and commits to it with `V_i = v_i·G`.
//! Children send their commitment to the root, which broadcasts the full
//! list back. The election key is `X = ΣV_i`; the matching private key is
//! never assembled in one place.

use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{public, random_scalar, Point},
    error::Result,
    overlay::{OverlayError, ProtocolInstance, TreeNodeInstance},
    protocol::{complete, finished, Done, Finished},
};

pub const NAME: &str = "dkg";

/// One node's share of an election's private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedSecret {
    /// Position of the node in the key generation tree.
    pub index: usize,
    /// The private share.
    pub v: Scalar,
    /// The joint public key.
    pub x: Point,
    /// Public commitment to `v`.
    pub commit: Point,
}

#[derive(Serialize, Deserialize)]
enum Message {
    Commit(Point),
    Commits(Vec<Point>),
}

pub struct DkgProtocol {
    node: TreeNodeInstance,
    share: Scalar,
    done: Done<SharedSecret>,
}

impl DkgProtocol {
    pub fn new(node: TreeNodeInstance) -> (Self, Finished<SharedSecret>) {
        let (done, finished) = finished();
        let protocol = Self {
            node,
            share: random_scalar(),
            done,
        };
        (protocol, finished)
    }

    async fn derive(&mut self) -> Result<SharedSecret> {
        let commit = public(&self.share);
        let commits = if self.node.is_root() {
            self.gather(commit).await?
        } else {
            self.collect(commit).await?
        };
        trace!("Node {} holds its key share", self.node.identity());
        Ok(SharedSecret {
            index: self.node.index(),
            v: self.share,
            x: commits.iter().sum(),
            commit,
        })
    }

    async fn gather(&mut self, commit: Point) -> Result<Vec<Point>> {
        let size = self.node.tree().size();
        let mut commits = vec![None; size];
        commits[0] = Some(commit);
        for _ in 0..self.node.children() {
            match self.node.receive().await? {
                (from, Message::Commit(point)) if commits[from].is_none() => {
                    commits[from] = Some(point)
                }
                (from, _) => return Err(OverlayError::UnexpectedMessage(from).into()),
            }
        }
        // Every slot was filled by a distinct child.
        let commits: Vec<_> = commits.into_iter().flatten().collect();
        self.node.send_to_children(&Message::Commits(commits.clone()))?;
        Ok(commits)
    }

    async fn collect(&mut self, commit: Point) -> Result<Vec<Point>> {
        self.node.send_to_root(&Message::Commit(commit))?;
        match self.node.receive().await? {
            (from, Message::Commits(commits)) if commits.len() == self.node.tree().size() => {
                if commits[self.node.index()] != commit {
                    return Err(OverlayError::UnexpectedMessage(from).into());
                }
                Ok(commits)
            }
            (from, _) => Err(OverlayError::UnexpectedMessage(from).into()),
        }
    }
}

#[rocket::async_trait]
impl ProtocolInstance for DkgProtocol {
    fn node(&self) -> &TreeNodeInstance {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TreeNodeInstance {
        &mut self.node
    }

    async fn dispatch(mut self: Box<Self>) -> Result<()> {
        let outcome = self.derive().await;
        complete(&mut self.done, outcome)
    }
}
