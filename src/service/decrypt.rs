use crate::{
    error::{Error, Result},
    model::{
        api::{Decrypt, DecryptReply},
        chain::fetch_election,
        election::Stage,
    },
    overlay::{ProtocolInstance, TreeNodeInstance, TreeShape},
    protocol::decrypt::{self, DecryptProtocol},
};

use super::{Run, Service, Synchronizer};

impl Service {
    /// Jointly decrypt the latest mix of an election. Every roster node
    /// contributes with the key share it stored during key generation.
    pub async fn decrypt(&self, req: Decrypt) -> Result<DecryptReply> {
        let (_, election) = self
            .retrieve(&req.token, &req.id, true, Some(Stage::Shuffled))
            .await?;
        let secret = self
            .secrets
            .get(&election.id)
            .await
            .ok_or_else(|| Error::MissingSecret(election.id.short()))?;

        let roster = election.roster.clone();
        let run = Run {
            roster: &roster,
            shape: TreeShape::FullRoster,
            name: decrypt::NAME,
            timeout: self.config.decrypt_timeout(),
            expired: Error::DecryptTimeout,
        };
        let ledger = self.ledger.clone();
        let decryption = Synchronizer::new(election.id)
            .run(&self.overlay, &self.identity, run, move |node| {
                let (protocol, finished) = DecryptProtocol::new(node, election, secret, ledger);
                (Box::new(protocol) as Box<dyn ProtocolInstance>, finished)
            })
            .await?;
        Ok(DecryptReply {
            choices: decryption.choices,
        })
    }

    pub(super) async fn join_decrypt(
        &self,
        node: TreeNodeInstance,
        sync: &Synchronizer,
    ) -> Result<Box<dyn ProtocolInstance>> {
        let secret = self
            .secrets
            .get(&sync.id)
            .await
            .ok_or_else(|| Error::MissingSecret(sync.id.short()))?;
        let election = fetch_election(self.ledger(), &sync.id).await?;
        let (protocol, _) = DecryptProtocol::new(node, election, secret, self.ledger.clone());
        Ok(Box::new(protocol))
    }
}
