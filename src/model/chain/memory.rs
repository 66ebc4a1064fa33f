use std::collections::HashMap;

use rocket::{serde::json::serde_json, tokio::sync::RwLock};

use crate::{
    model::{
        election::{frozen_box, latest_mix, Stage},
        id::LedgerId,
    },
    overlay::Roster,
};

use super::{Genesis, Ledger, LedgerError, Record};

/// Ledger store held in process memory. One instance is shared by every
/// node of a cluster, which stands in for replication.
#[derive(Default)]
pub struct MemoryLedger {
    chains: RwLock<HashMap<LedgerId, Vec<Record>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl Ledger for MemoryLedger {
    async fn create(&self, roster: &Roster) -> Result<LedgerId, LedgerError> {
        let genesis = Genesis {
            roster: roster.clone(),
            nonce: rand::random(),
        };
        let id = LedgerId::digest(&serde_json::to_vec(&genesis)?);
        self.chains
            .write()
            .await
            .insert(id, vec![Record::Genesis(genesis)]);
        debug!("Created ledger {}", id.short());
        Ok(id)
    }

    async fn append(&self, id: &LedgerId, record: Record) -> Result<usize, LedgerError> {
        let mut chains = self.chains.write().await;
        let chain = chains
            .get_mut(id)
            .ok_or(LedgerError::UnknownLedger(*id))?;
        admit(chain, &record)?;
        trace!("Appending {} to ledger {}", record.kind(), id.short());
        chain.push(record);
        Ok(chain.len() - 1)
    }

    async fn records(&self, id: &LedgerId) -> Result<Vec<Record>, LedgerError> {
        self.chains
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(LedgerError::UnknownLedger(*id))
    }
}

/// Decide whether `record` may extend `chain`.
fn admit(chain: &[Record], record: &Record) -> Result<(), LedgerError> {
    let reject = |reason: String| Err(LedgerError::Rejected(reason));
    match (chain.get(1), record) {
        (_, Record::Genesis(_)) => reject("genesis can only be written at creation".into()),
        (None, Record::Master(_) | Record::Election(_)) => Ok(()),
        (None, other) => reject(format!("{} before the chain header", other.kind())),
        (Some(_), Record::Master(_) | Record::Election(_)) => {
            reject("chain already has a header".into())
        }
        (Some(Record::Master(_)), Record::Link(_)) => Ok(()),
        (Some(Record::Master(_)), other) => {
            reject(format!("{} not allowed on a master chain", other.kind()))
        }
        (Some(Record::Election(_)), Record::Link(_)) => {
            reject("link not allowed on an election chain".into())
        }
        (Some(Record::Election(_)), other) => admit_election(chain, other),
        (Some(header), _) => reject(format!("corrupt chain header {}", header.kind())),
    }
}

fn admit_election(chain: &[Record], record: &Record) -> Result<(), LedgerError> {
    let stage = Stage::of(chain);
    let reject = |reason: String| Err(LedgerError::Rejected(reason));
    match record {
        Record::Ballot(_) | Record::Box(_) | Record::Mix(_) if stage != Stage::Running => {
            reject(format!("{} not allowed once {stage}", record.kind()))
        }
        Record::Mix(mix) => match frozen_box(chain) {
            None => reject("mix without a frozen box".into()),
            Some(frozen) if frozen.ballots.len() != mix.ballots.len() => reject(format!(
                "mix holds {} ballots, frozen box {}",
                mix.ballots.len(),
                frozen.ballots.len()
            )),
            Some(_) => Ok(()),
        },
        Record::Decryption(_) if stage != Stage::Shuffled => {
            reject(format!("decryption not allowed while {stage}"))
        }
        Record::Decryption(decryption) => match latest_mix(chain) {
            Some(mix) if mix.ballots.len() == decryption.choices.len() => Ok(()),
            _ => reject("decryption does not match the latest mix".into()),
        },
        _ => Ok(()),
    }
}
