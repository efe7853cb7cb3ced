// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, net::SocketAddr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Registry-assigned client ids start here and are never reused.
pub const FIRST_CLIENT_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connected,
    Authenticated,
    Error,
    Closed,
}

impl ClientStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }
}

/// The credentialed identity a connection is bound to while Authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundIdentity {
    pub user_id: u64,
    pub username: String,
}

/// One live connection. Owned exclusively by the registry; outside observers
/// get snapshots, never references they can keep.
#[derive(Debug)]
pub struct ClientEntry {
    pub handle: u64,
    pub client_id: u64,
    pub addr: SocketAddr,
    pub status: ClientStatus,
    pub identity: Option<BoundIdentity>,
    pub connected_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    outbound: UnboundedSender<Bytes>,
}

impl ClientEntry {
    /// Queues a frame on this connection's socket. False when the transport
    /// side is gone.
    pub fn enqueue(&self, frame: Bytes) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.username.as_str())
    }
}

/// Point-in-time view of one entry, safe to hold across mutations.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub handle: u64,
    pub client_id: u64,
    pub addr: SocketAddr,
    pub status: ClientStatus,
    pub username: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no client with handle {0}")]
    UnknownHandle(u64),
    #[error("user `{0}` is already bound to another connection")]
    IdentityInUse(String),
}

/// The canonical table of live connections. All access is serialized by
/// construction: the event-loop task is its only owner.
#[derive(Debug)]
pub struct ConnectionRegistry {
    clients: HashMap<u64, ClientEntry>,
    next_client_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: FIRST_CLIENT_ID,
        }
    }

    /// Inserts a connection in status Connected with a fresh id and now
    /// timestamps. Idempotent: a duplicate handle keeps the existing entry
    /// and returns its id.
    pub fn add(
        &mut self,
        handle: u64,
        addr: SocketAddr,
        outbound: UnboundedSender<Bytes>,
    ) -> u64 {
        if let Some(existing) = self.clients.get(&handle) {
            return existing.client_id;
        }
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        let now = Utc::now();
        self.clients.insert(handle, ClientEntry {
            handle,
            client_id,
            addr,
            status: ClientStatus::Connected,
            identity: None,
            connected_at: now,
            last_active: now,
            outbound,
        });
        client_id
    }

    /// Drops the entry. Idempotent: removing an unknown handle is a no-op.
    pub fn remove(&mut self, handle: u64) -> Option<ClientEntry> {
        self.clients.remove(&handle)
    }

    pub fn find_by_handle(&self, handle: u64) -> Option<&ClientEntry> {
        self.clients.get(&handle)
    }

    /// The Authenticated entry bound to `name`, if any. O(n) over a table
    /// bounded by the max-clients configuration.
    pub fn find_by_username(&self, name: &str) -> Option<&ClientEntry> {
        self.clients.values().find(|c| {
            c.status == ClientStatus::Authenticated && c.username() == Some(name)
        })
    }

    pub fn find_by_user_id(&self, user_id: u64) -> Option<&ClientEntry> {
        self.clients.values().find(|c| {
            c.status == ClientStatus::Authenticated
                && c.identity.as_ref().is_some_and(|id| id.user_id == user_id)
        })
    }

    /// Updates last-activity to now. Unknown handles are ignored.
    pub fn touch(&mut self, handle: u64) {
        if let Some(entry) = self.clients.get_mut(&handle) {
            entry.last_active = Utc::now();
        }
    }

    /// Binds a credentialed identity and transitions to Authenticated.
    /// Rejects a second Authenticated entry for the same username; rebinding
    /// the same handle to the same identity is accepted.
    pub fn bind_identity(
        &mut self,
        handle: u64,
        user_id: u64,
        username: &str,
    ) -> Result<(), RegistryError> {
        if let Some(other) = self.find_by_username(username)
            && other.handle != handle
        {
            return Err(RegistryError::IdentityInUse(username.to_string()));
        }
        let entry = self
            .clients
            .get_mut(&handle)
            .ok_or(RegistryError::UnknownHandle(handle))?;
        entry.identity = Some(BoundIdentity {
            user_id,
            username: username.to_string(),
        });
        entry.status = ClientStatus::Authenticated;
        Ok(())
    }

    /// Clears the bound identity and transitions back to Connected.
    pub fn unbind_identity(&mut self, handle: u64) -> Result<(), RegistryError> {
        let entry = self
            .clients
            .get_mut(&handle)
            .ok_or(RegistryError::UnknownHandle(handle))?;
        entry.identity = None;
        entry.status = ClientStatus::Connected;
        Ok(())
    }

    pub fn set_status(
        &mut self,
        handle: u64,
        status: ClientStatus,
    ) -> Result<(), RegistryError> {
        let entry = self
            .clients
            .get_mut(&handle)
            .ok_or(RegistryError::UnknownHandle(handle))?;
        entry.status = status;
        Ok(())
    }

    /// Stable view for broadcast, ordered by client id. Atomic with respect
    /// to add/remove because the registry has a single owner.
    pub fn snapshot(&self) -> Vec<ClientSnapshot> {
        let mut view: Vec<ClientSnapshot> = self
            .clients
            .values()
            .map(|c| ClientSnapshot {
                handle: c.handle,
                client_id: c.client_id,
                addr: c.addr,
                status: c.status,
                username: c.username().map(ToOwned::to_owned),
            })
            .collect();
        view.sort_unstable_by_key(|c| c.client_id);
        view
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn handles(&self) -> Vec<u64> {
        self.clients.keys().copied().collect()
    }

    /// Handles whose last activity predates `cutoff`. Used by the idle sweep.
    pub fn idle_handles(&self, cutoff: DateTime<Utc>) -> Vec<u64> {
        self.clients
            .values()
            .filter(|c| c.last_active < cutoff)
            .map(|c| c.handle)
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
