use std::sync::Arc;

use crate::{
    config::Config,
    crypto::{public, random_scalar},
    error::{Error, Result},
    model::{api::Link, chain::MemoryLedger, id::LedgerId, User},
    overlay::{Overlay, Roster, ServerIdentity},
    service::Service,
};

/// A set of services sharing one ledger store and one overlay, all in this
/// process.
#[derive(Clone)]
pub struct LocalCluster {
    services: Vec<Arc<Service>>,
    overlay: Overlay,
    ledger: Arc<MemoryLedger>,
}

impl LocalCluster {
    /// Start `nodes` services named `local://node0` onwards.
    pub async fn new(nodes: usize, config: &Config) -> Self {
        let identities = (0..nodes)
            .map(|i| ServerIdentity::new(format!("local://node{i}")))
            .collect();
        Self::with_identities(identities, config).await
    }

    pub async fn with_identities(identities: Vec<ServerIdentity>, config: &Config) -> Self {
        let overlay = Overlay::new();
        let ledger = Arc::new(MemoryLedger::new());
        let mut services = Vec::with_capacity(identities.len());
        for identity in identities {
            services.push(Service::new(identity, overlay.clone(), ledger.clone(), config).await);
        }
        Self {
            services,
            overlay,
            ledger,
        }
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    /// # Panics
    /// If the cluster has no node `index`.
    pub fn node(&self, index: usize) -> &Arc<Service> {
        &self.services[index]
    }

    pub fn roster(&self) -> Roster {
        Roster::new(
            self.services
                .iter()
                .map(|service| service.identity().clone())
                .collect(),
        )
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    /// Register a master over the whole cluster through node 0, with a
    /// fresh signing key.
    pub async fn link(&self, admins: Vec<User>) -> Result<LedgerId> {
        let service = self.node(0);
        let reply = service
            .link(Link {
                pin: service.pin().to_string(),
                key: public(&random_scalar()),
                roster: self.roster(),
                admins,
            })
            .await?;
        reply.master.ok_or(Error::WrongPin)
    }

    /// Take every node off the overlay.
    pub async fn shutdown(&self) {
        for service in &self.services {
            self.overlay.unregister(service.identity()).await;
        }
    }
}
