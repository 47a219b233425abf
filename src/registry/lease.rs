//! Lease table of remote clients

use std::collections::HashMap;

use super::client::{ClientInfo, ClientKey};
use super::error::RegistryError;
use crate::protocol::constants::{CLIENT_LEASE_SECS, MAX_CLIENT_NUM};

/// Outcome of a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// First heartbeat of this client
    Inserted,
    /// Known client, lease renewed
    Refreshed,
}

/// Bounded table of clients ordered by first heartbeat
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Vec<ClientInfo>,
    index: HashMap<ClientKey, usize>,
    lease_secs: i64,
    max_clients: usize,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(CLIENT_LEASE_SECS, MAX_CLIENT_NUM)
    }
}

impl ClientRegistry {
    pub fn new(lease_secs: u32, max_clients: usize) -> Self {
        Self {
            clients: Vec::new(),
            index: HashMap::new(),
            lease_secs: i64::from(lease_secs),
            max_clients,
        }
    }

    /// Lease granted to clients, in seconds
    pub fn lease_secs(&self) -> u32 {
        self.lease_secs as u32
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Record a heartbeat from `client` at `now` (seconds since the epoch).
    ///
    /// A known client has its stored record replaced. An unknown client is
    /// appended unless the table is full.
    pub fn touch(&mut self, mut client: ClientInfo, now: i64) -> Result<Touch, RegistryError> {
        client.last_active = now;
        let key = client.key();

        if let Some(&position) = self.index.get(&key) {
            self.clients[position] = client;
            return Ok(Touch::Refreshed);
        }

        if self.clients.len() >= self.max_clients {
            return Err(RegistryError::Full {
                max: self.max_clients,
            });
        }

        self.index.insert(key, self.clients.len());
        self.clients.push(client);
        Ok(Touch::Inserted)
    }

    /// Drop every client whose lease ran out, returning them
    pub fn evict(&mut self, now: i64) -> Vec<ClientInfo> {
        let lease = self.lease_secs;
        let (alive, expired): (Vec<_>, Vec<_>) = self
            .clients
            .drain(..)
            .partition(|c| now - c.last_active < lease);

        self.clients = alive;
        if !expired.is_empty() {
            self.index = self
                .clients
                .iter()
                .enumerate()
                .map(|(i, c)| (c.key(), i))
                .collect();
        }
        expired
    }

    /// Return the total number of clients and up to `count` of them
    /// starting at `start`
    pub fn list(&self, start: usize, count: usize) -> (usize, Vec<ClientInfo>) {
        let page = self
            .clients
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect();
        (self.clients.len(), page)
    }
}
