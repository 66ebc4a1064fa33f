use std::{collections::HashMap, sync::Arc};

use rocket::tokio::sync::Mutex;

use crate::{model::id::LedgerId, protocol::dkg::SharedSecret};

/// This node's key shares, keyed by the short form of the election ID.
#[derive(Clone, Default)]
pub struct Secrets {
    shares: Arc<Mutex<HashMap<String, SharedSecret>>>,
}

impl Secrets {
    /// Store the share for election `id`. A share is never replaced: returns
    /// false and keeps the existing one if the election already has a share.
    pub async fn insert(&self, id: &LedgerId, secret: SharedSecret) -> bool {
        let mut shares = self.shares.lock().await;
        if shares.contains_key(&id.short()) {
            warn!("Key share for election {} already stored", id.short());
            return false;
        }
        shares.insert(id.short(), secret);
        true
    }

    pub async fn get(&self, id: &LedgerId) -> Option<SharedSecret> {
        self.shares.lock().await.get(&id.short()).cloned()
    }
}
