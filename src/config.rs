use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Deserialize;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. Every field has a default, so a missing key
/// never stops a node from starting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    nodes: usize,
    // seconds
    session_ttl: u32,
    session_sweep: u32,
    // milliseconds
    dkg_timeout: u64,
    shuffle_timeout: u64,
    decrypt_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: 3,
            session_ttl: 1800,
            session_sweep: 180,
            dkg_timeout: 2000,
            shuffle_timeout: 5000,
            decrypt_timeout: 2000,
        }
    }
}

impl Config {
    /// Number of nodes in the cluster started by the server binary.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Ports of the cluster's nodes, counting up from `base`. `None` if they
    /// run past the last port.
    pub fn ports(&self, base: u16) -> Option<Vec<u16>> {
        (0..self.nodes)
            .map(|i| u16::try_from(i).ok().and_then(|i| base.checked_add(i)))
            .collect()
    }

    /// Age after which a session is evicted.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// Period of the session sweep.
    pub fn session_sweep(&self) -> StdDuration {
        StdDuration::from_secs(self.session_sweep.into())
    }

    /// How long opening an election waits for key generation.
    pub fn dkg_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.dkg_timeout)
    }

    /// How long a shuffle request waits for the mix.
    pub fn shuffle_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.shuffle_timeout)
    }

    /// How long a decrypt request waits for joint decryption.
    pub fn decrypt_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.decrypt_timeout)
    }
}

#[cfg(test)]
impl Config {
    /// Override every protocol timeout.
    pub fn with_timeouts(mut self, millis: u64) -> Self {
        self.dkg_timeout = millis;
        self.shuffle_timeout = millis;
        self.decrypt_timeout = millis;
        self
    }
}
