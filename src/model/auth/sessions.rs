use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use rocket::tokio::sync::Mutex;

use crate::{model::User, scheduled_task::PeriodicTask};

/// Identity and privilege bound to a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub user: User,
    pub admin: bool,
    issued_at: DateTime<Utc>,
}

impl Stamp {
    fn new(user: User, admin: bool) -> Self {
        Self {
            user,
            admin,
            issued_at: Utc::now(),
        }
    }
}

/// The log of logged-in users held by one node.
pub struct Sessions {
    log: Mutex<HashMap<String, Stamp>>,
    ttl: Duration,
}

impl Sessions {
    /// Sessions are evicted by [`Sessions::sweep`] once older than `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            log: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Open a session for `user`, returning its fresh token.
    pub async fn register(&self, user: User, admin: bool) -> String {
        let token = BASE64URL_NOPAD.encode(&rand::random::<[u8; 32]>());
        self.log
            .lock()
            .await
            .insert(token.clone(), Stamp::new(user, admin));
        token
    }

    /// The stamp behind `token`. A copy is returned, so that a concurrent
    /// sweep cannot pull it from under a request in flight.
    pub async fn lookup(&self, token: &str) -> Option<Stamp> {
        self.log.lock().await.get(token).cloned()
    }

    /// Evict every session older than the configured lifetime. Returns how
    /// many were evicted.
    pub async fn sweep(&self) -> usize {
        let deadline = Utc::now() - self.ttl;
        let mut log = self.log.lock().await;
        let before = log.len();
        log.retain(|_, stamp| stamp.issued_at > deadline);
        before - log.len()
    }

    /// Sweep expired sessions every `interval` until the returned task is
    /// dropped.
    pub fn schedule(self: &Arc<Self>, interval: std::time::Duration) -> PeriodicTask {
        let sessions = Arc::clone(self);
        PeriodicTask::new(interval, move || {
            let sessions = Arc::clone(&sessions);
            async move {
                let evicted = sessions.sweep().await;
                if evicted > 0 {
                    debug!("Swept {evicted} expired sessions");
                }
            }
        })
    }

    /// Bind a chosen token directly, bypassing login.
    #[cfg(test)]
    pub async fn insert(&self, token: &str, user: User, admin: bool) {
        self.log
            .lock()
            .await
            .insert(token.to_string(), Stamp::new(user, admin));
    }
}
