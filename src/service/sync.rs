//! Protocol Synchronizer: launch a protocol over an election's roster and
//! wait, bounded, for its completion.

use std::time::Duration;

use rocket::{serde::json::serde_json, tokio::time::timeout};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::id::LedgerId,
    overlay::{
        GenericConfig, Overlay, OverlayError, ProtocolInstance, Roster, ServerIdentity,
        TreeNodeInstance, TreeShape,
    },
    protocol::Finished,
};

/// Payload attached to every protocol start, so that each node joining the
/// tree resolves the election from its own ledger view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synchronizer {
    pub id: LedgerId,
}

/// How a protocol is to be run.
pub struct Run<'a> {
    pub roster: &'a Roster,
    pub shape: TreeShape,
    pub name: &'static str,
    pub timeout: Duration,
    /// Reported if `timeout` elapses before the protocol completes.
    pub expired: Error,
}

impl Synchronizer {
    pub fn new(id: LedgerId) -> Self {
        Self { id }
    }

    pub fn to_config(&self) -> Result<GenericConfig> {
        Ok(GenericConfig {
            data: serde_json::to_vec(self)?,
        })
    }

    pub fn from_config(config: &GenericConfig) -> Result<Self> {
        serde_json::from_slice(&config.data).map_err(|e| OverlayError::Marshal(e).into())
    }

    /// Start a protocol rooted at `root` and wait for its completion.
    ///
    /// `setup` turns the root's tree node into the protocol instance and the
    /// receiver its outcome arrives on. A failure of the root's instance is
    /// returned as is. When the timer fires first, or the root gives up
    /// waiting for its peers, `run.expired` is returned; the other nodes'
    /// instances are left to reach their own deadlines.
    pub async fn run<T, F>(
        &self,
        overlay: &Overlay,
        root: &ServerIdentity,
        run: Run<'_>,
        setup: F,
    ) -> Result<T>
    where
        T: Send,
        F: FnOnce(TreeNodeInstance) -> (Box<dyn ProtocolInstance>, Finished<T>) + Send,
    {
        let tree = run.roster.generate_tree(run.shape, root)?;
        let size = tree.size();
        let mut node = overlay.create_protocol(run.name, tree);
        node.set_config(self.to_config()?);
        node.set_deadline(run.timeout);
        let (protocol, finished) = setup(node);

        info!(
            "Starting {} over {size} nodes for election {}",
            run.name,
            self.id.short()
        );
        overlay.start(protocol).await?;

        match timeout(run.timeout, finished).await {
            Ok(Ok(Err(Error::Overlay(OverlayError::Expired(_))))) | Err(_) => {
                warn!(
                    "{} for election {} timed out after {:?}",
                    run.name,
                    self.id.short(),
                    run.timeout
                );
                Err(run.expired)
            }
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ProtocolAborted(run.name)),
        }
    }
}
