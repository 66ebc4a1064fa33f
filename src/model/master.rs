use serde::{Deserialize, Serialize};

use crate::{
    crypto::Point,
    model::{
        chain::{Ledger, LedgerError, Record},
        id::LedgerId,
        User,
    },
    overlay::Roster,
};

/// Header record of a master chain: the deployment-wide registry of admins
/// and of the elections they opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Master {
    pub key: Point,
    pub id: LedgerId,
    pub roster: Roster,
    pub admins: Vec<User>,
}

impl Master {
    pub fn is_admin(&self, user: User) -> bool {
        self.admins.contains(&user)
    }

    /// Links to every election opened under this master, in append order.
    pub async fn links(&self, ledger: &dyn Ledger) -> Result<Vec<Link>, LedgerError> {
        let records = ledger.records(&self.id).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                Record::Link(link) => Some(link),
                _ => None,
            })
            .collect())
    }
}

/// Points a master chain at one election chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub genesis: LedgerId,
}
