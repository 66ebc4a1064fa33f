use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

use super::OverlayError;

/// Network identity of one node of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub address: String,
}

impl ServerIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Display for ServerIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// The ordered set of nodes authorized to run an election's protocols.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Roster {
    pub list: Vec<ServerIdentity>,
}

/// Which of a roster's nodes take part in a protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeShape {
    /// Every roster member joins.
    FullRoster,
    /// Only the root runs the protocol.
    SingleNode,
}

impl Roster {
    pub fn new(list: Vec<ServerIdentity>) -> Self {
        Self { list }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, identity: &ServerIdentity) -> bool {
        self.list.contains(identity)
    }

    /// Build a star over the roster with `root` at its centre.
    pub fn generate_tree(
        &self,
        shape: TreeShape,
        root: &ServerIdentity,
    ) -> Result<Tree, OverlayError> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.list.iter().find(|id| !seen.insert(*id)) {
            return Err(OverlayError::MalformedRoster(format!(
                "{duplicate} listed twice"
            )));
        }
        if !self.contains(root) {
            return Err(OverlayError::NotInRoster(root.clone()));
        }

        let mut nodes = vec![root.clone()];
        if shape == TreeShape::FullRoster {
            nodes.extend(self.list.iter().filter(|id| *id != root).cloned());
        }
        Ok(Tree { nodes })
    }
}

/// A rooted communication topology. The first node is the root; all
/// others hang directly below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<ServerIdentity>,
}

impl Tree {
    pub fn root(&self) -> &ServerIdentity {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[ServerIdentity] {
        &self.nodes
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl Roster {
        pub fn example(size: usize) -> Self {
            Self::new(
                (0..size)
                    .map(|i| ServerIdentity::new(format!("local://node{i}")))
                    .collect(),
            )
        }
    }
}
