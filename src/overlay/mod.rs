//! In-process substrate that runs multi-party protocols over a tree of nodes.
//!
//! Each node's service registers itself as a [`ProtocolFactory`]. When the
//! root starts a protocol, every other node of the tree is asked for its own
//! [`ProtocolInstance`] through that callback, receiving the root's
//! [`GenericConfig`], and the instances then talk over per-node channels.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use rocket::{
    serde::json::serde_json::{self, Error as JsonError},
    tokio::{
        self,
        sync::{mpsc, RwLock},
        time::{timeout_at, Instant},
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;

mod roster;

pub use roster::{Roster, ServerIdentity, Tree, TreeShape};

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("{0} is not part of the roster")]
    NotInRoster(ServerIdentity),
    #[error("Malformed roster: {0}")]
    MalformedRoster(String),
    #[error("Unknown protocol {0}")]
    UnknownProtocol(String),
    #[error("Only the root of a tree can start protocol {0}")]
    NotRoot(&'static str),
    #[error("Channel to tree node {0} is closed")]
    ChannelClosed(usize),
    #[error("Tree node {0} gave up waiting for its peers")]
    Expired(usize),
    #[error("Unexpected message from tree node {0}")]
    UnexpectedMessage(usize),
    #[error("Protocol {0} started without a configuration")]
    MissingConfig(&'static str),
    #[error(transparent)]
    Marshal(#[from] JsonError),
}

/// Opaque configuration attached by the root and handed to every node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericConfig {
    pub data: Vec<u8>,
}

struct Envelope {
    from: usize,
    data: Vec<u8>,
}

/// One node's handle on a running protocol instance.
pub struct TreeNodeInstance {
    name: &'static str,
    tree: Arc<Tree>,
    index: usize,
    config: Option<GenericConfig>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    outboxes: Arc<Vec<mpsc::UnboundedSender<Envelope>>>,
    deadline: Option<Instant>,
    // Instances of the other nodes, held by the root until the protocol starts.
    pending: Vec<TreeNodeInstance>,
}

impl TreeNodeInstance {
    pub fn protocol_name(&self) -> &'static str {
        self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_root(&self) -> bool {
        self.index == 0
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.tree.nodes()[self.index]
    }

    /// Number of nodes directly below this one.
    pub fn children(&self) -> usize {
        if self.is_root() {
            self.tree.size() - 1
        } else {
            0
        }
    }

    pub fn set_config(&mut self, config: GenericConfig) {
        self.config = Some(config);
    }

    pub fn config(&self) -> Option<&GenericConfig> {
        self.config.as_ref()
    }

    /// Stop waiting for messages `after` from now. Every node holds a sender
    /// to its own inbox, so without a deadline an instance whose peers are
    /// gone waits forever.
    pub fn set_deadline(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn send_to_root<T: Serialize>(&self, msg: &T) -> Result<()> {
        self.send(0, serde_json::to_vec(msg)?)
    }

    pub fn send_to_children<T: Serialize>(&self, msg: &T) -> Result<()> {
        let data = serde_json::to_vec(msg)?;
        for child in 1..=self.children() {
            self.send(child, data.clone())?;
        }
        Ok(())
    }

    /// Wait for the next message addressed to this node.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<(usize, T)> {
        let index = self.index;
        let next = self.inbox.recv();
        let envelope = match self.deadline {
            Some(deadline) => timeout_at(deadline, next)
                .await
                .map_err(|_| OverlayError::Expired(index))?,
            None => next.await,
        }
        .ok_or(OverlayError::ChannelClosed(index))?;
        let msg = serde_json::from_slice(&envelope.data).map_err(OverlayError::from)?;
        Ok((envelope.from, msg))
    }

    fn send(&self, to: usize, data: Vec<u8>) -> Result<()> {
        self.outboxes[to]
            .send(Envelope {
                from: self.index,
                data,
            })
            .map_err(|_| OverlayError::ChannelClosed(to).into())
    }
}

/// Local state machine of one node taking part in a protocol.
#[rocket::async_trait]
pub trait ProtocolInstance: Send + 'static {
    fn node(&self) -> &TreeNodeInstance;

    fn node_mut(&mut self) -> &mut TreeNodeInstance;

    /// Run this node's side of the protocol to completion.
    async fn dispatch(self: Box<Self>) -> Result<()>;
}

/// Invoked on a non-root node once per protocol start, to build that
/// node's instance from the configuration the root attached.
#[rocket::async_trait]
pub trait ProtocolFactory: Send + Sync {
    async fn new_protocol(
        &self,
        node: TreeNodeInstance,
        config: &GenericConfig,
    ) -> Result<Box<dyn ProtocolInstance>>;
}

type Registry = HashMap<ServerIdentity, Weak<dyn ProtocolFactory>>;

/// Handle on the substrate shared by every node of a cluster.
#[derive(Clone, Default)]
pub struct Overlay {
    registry: Arc<RwLock<Registry>>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `factory` reachable as `identity`. The factory is held weakly so
    /// that a dropped service simply stops answering.
    pub async fn register(&self, identity: ServerIdentity, factory: Weak<dyn ProtocolFactory>) {
        self.registry.write().await.insert(identity, factory);
    }

    pub async fn unregister(&self, identity: &ServerIdentity) {
        self.registry.write().await.remove(identity);
    }

    /// Wire up a fresh protocol instance over `tree`, returning the root's
    /// handle. The other nodes' handles stay pending inside it.
    pub fn create_protocol(&self, name: &'static str, tree: Tree) -> TreeNodeInstance {
        let tree = Arc::new(tree);
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..tree.size()).map(|_| mpsc::unbounded_channel()).unzip();
        let outboxes = Arc::new(senders);

        let mut instances = receivers
            .into_iter()
            .enumerate()
            .map(|(index, inbox)| TreeNodeInstance {
                name,
                tree: tree.clone(),
                index,
                config: None,
                inbox,
                outboxes: outboxes.clone(),
                deadline: None,
                pending: Vec::new(),
            });
        // Trees always contain their root, so the iterator is never empty.
        let mut root = match instances.next() {
            Some(root) => root,
            None => unreachable!("tree without root"),
        };
        root.pending = instances.collect();
        root
    }

    /// Launch a protocol from its root instance. Returns once every node has
    /// been asked to join; completion is signalled by the protocol itself.
    pub async fn start(&self, mut protocol: Box<dyn ProtocolInstance>) -> Result<()> {
        let node = protocol.node_mut();
        let name = node.protocol_name();
        if !node.is_root() {
            return Err(OverlayError::NotRoot(name).into());
        }
        let config = node
            .config()
            .cloned()
            .ok_or(OverlayError::MissingConfig(name))?;
        let pending = std::mem::take(&mut node.pending);

        let registry = self.registry.read().await;
        let children: Vec<_> = pending
            .into_iter()
            .map(|child| {
                let factory = registry.get(child.identity()).and_then(Weak::upgrade);
                (child, factory)
            })
            .collect();
        drop(registry);

        debug!("Starting {name} over {} nodes", children.len() + 1);
        for (child, factory) in children {
            let config = config.clone();
            tokio::spawn(async move {
                let identity = child.identity().clone();
                let factory = match factory {
                    Some(factory) => factory,
                    None => {
                        warn!("No service answers at {identity}, {name} runs without it");
                        return;
                    }
                };
                match factory.new_protocol(child, &config).await {
                    Ok(instance) => run(instance).await,
                    Err(e) => warn!("{identity} could not join {name}: {e}"),
                }
            });
        }
        tokio::spawn(run(protocol));
        Ok(())
    }
}

async fn run(instance: Box<dyn ProtocolInstance>) {
    let name = instance.node().protocol_name();
    let identity = instance.node().identity().clone();
    match instance.dispatch().await {
        Ok(()) => trace!("{name} finished on {identity}"),
        Err(e) => warn!("{name} failed on {identity}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use rocket::tokio::sync::oneshot;

    use super::*;

    const ECHO: &str = "echo";

    /// Every child reports its index to the root, which completes once it
    /// has heard from all of them.
    struct Echo {
        node: TreeNodeInstance,
        done: Option<oneshot::Sender<Vec<usize>>>,
    }

    #[rocket::async_trait]
    impl ProtocolInstance for Echo {
        fn node(&self) -> &TreeNodeInstance {
            &self.node
        }

        fn node_mut(&mut self) -> &mut TreeNodeInstance {
            &mut self.node
        }

        async fn dispatch(mut self: Box<Self>) -> Result<()> {
            if !self.node.is_root() {
                return self.node.send_to_root(&self.node.index());
            }
            let mut heard = Vec::new();
            while heard.len() < self.node.children() {
                let (from, index): (usize, usize) = self.node.receive().await?;
                assert_eq!(from, index);
                heard.push(index);
            }
            heard.sort_unstable();
            if let Some(done) = self.done.take() {
                let _ = done.send(heard);
            }
            Ok(())
        }
    }

    struct EchoFactory;

    #[rocket::async_trait]
    impl ProtocolFactory for EchoFactory {
        async fn new_protocol(
            &self,
            node: TreeNodeInstance,
            config: &GenericConfig,
        ) -> Result<Box<dyn ProtocolInstance>> {
            assert_eq!(config.data, b"payload");
            Ok(Box::new(Echo { node, done: None }))
        }
    }

    async fn overlay_for(roster: &Roster, factory: &Arc<dyn ProtocolFactory>) -> Overlay {
        let overlay = Overlay::new();
        for identity in &roster.list {
            overlay
                .register(identity.clone(), Arc::downgrade(factory))
                .await;
        }
        overlay
    }

    #[rocket::async_test]
    async fn children_join_through_factory() {
        let roster = Roster::example(4);
        let factory: Arc<dyn ProtocolFactory> = Arc::new(EchoFactory);
        let overlay = overlay_for(&roster, &factory).await;

        let tree = roster
            .generate_tree(TreeShape::FullRoster, &roster.list[0])
            .unwrap();
        let mut node = overlay.create_protocol(ECHO, tree);
        node.set_config(GenericConfig {
            data: b"payload".to_vec(),
        });
        let (tx, rx) = oneshot::channel();
        overlay
            .start(Box::new(Echo {
                node,
                done: Some(tx),
            }))
            .await
            .unwrap();

        assert_eq!(rx.await.unwrap(), vec![1, 2, 3]);
    }

    #[rocket::async_test]
    async fn receive_gives_up_at_the_deadline() {
        let roster = Roster::example(2);
        let tree = roster
            .generate_tree(TreeShape::FullRoster, &roster.list[0])
            .unwrap();
        let mut node = Overlay::new().create_protocol(ECHO, tree);
        node.set_deadline(Duration::from_millis(50));

        // The child never answers, and the root's own sender keeps its inbox open.
        let result = node.receive::<usize>().await;
        assert!(matches!(
            result,
            Err(crate::error::Error::Overlay(OverlayError::Expired(0)))
        ));
    }

    #[rocket::async_test]
    async fn start_requires_config() {
        let roster = Roster::example(1);
        let overlay = Overlay::new();
        let tree = roster
            .generate_tree(TreeShape::SingleNode, &roster.list[0])
            .unwrap();
        let node = overlay.create_protocol(ECHO, tree);
        let result = overlay.start(Box::new(Echo { node, done: None })).await;
        assert!(matches!(
            result,
            Err(crate::error::Error::Overlay(OverlayError::MissingConfig(ECHO)))
        ));
    }
}
