// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;
use tracing::debug;

use crate::{
    models::response::ResponseCode,
    server::registry::{ClientEntry, ClientStatus, ConnectionRegistry, RegistryError},
    store::CredentialStore,
};

/// Why a login attempt was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid username or password")]
    BadCredentials,
    #[error("Already logged in as {0}")]
    AlreadyBound(String),
    #[error("User {0} is already logged in")]
    AlreadyOnline(String),
    #[error("Unknown connection handle {0}")]
    UnknownHandle(u64),
}

impl AuthError {
    pub fn code(&self) -> ResponseCode {
        match self {
            Self::UnknownHandle(_) => ResponseCode::ServerError,
            _ => ResponseCode::AuthFailed,
        }
    }
}

/// Drives the per-client state machine over the registry, using the
/// credential store:
///
/// ```text
/// Connected ──authenticate ok──▶ Authenticated
/// Connected ──authenticate err─▶ Connected      (error surfaced, no change)
/// Authenticated ──logout───────▶ Connected
/// any ──transport failure──────▶ Closed         (terminal: entry removed)
/// ```
#[derive(Debug)]
pub struct SessionManager {
    registry: ConnectionRegistry,
    store: CredentialStore,
}

impl SessionManager {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConnectionRegistry {
        &mut self.registry
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Binds `handle` to `name` when the credentials check out. Idempotent
    /// when the handle is already Authenticated as the same identity; a
    /// different identity on an Authenticated handle is refused, as is a
    /// username that is Authenticated on another handle.
    pub fn authenticate(
        &mut self,
        handle: u64,
        name: &str,
        credential: &str,
    ) -> Result<(), AuthError> {
        let entry = self
            .registry
            .find_by_handle(handle)
            .ok_or(AuthError::UnknownHandle(handle))?;

        if let Some(identity) = &entry.identity {
            if identity.username == name {
                debug!(handle, user = name, "repeated login, already bound");
                return Ok(());
            }
            return Err(AuthError::AlreadyBound(identity.username.clone()));
        }

        if !self.store.authenticate(name, credential) {
            return Err(AuthError::BadCredentials);
        }
        let user_id = self
            .store
            .lookup_by_name(name)
            .map(|u| u.user_id)
            .ok_or(AuthError::BadCredentials)?;

        self.registry
            .bind_identity(handle, user_id, name)
            .map_err(|e| match e {
                RegistryError::IdentityInUse(user) => AuthError::AlreadyOnline(user),
                RegistryError::UnknownHandle(h) => AuthError::UnknownHandle(h),
            })?;
        debug!(handle, user = name, user_id, "session authenticated");
        Ok(())
    }

    /// Returns the handle to Connected. A no-op on a handle that is not
    /// Authenticated (or already gone).
    pub fn logout(&mut self, handle: u64) {
        if self.is_authenticated(handle) {
            let _ = self.registry.unbind_identity(handle);
            debug!(handle, "session logged out");
        }
    }

    /// Terminal transition on transport failure: the entry leaves the
    /// registry for good.
    pub fn close(&mut self, handle: u64) -> Option<ClientEntry> {
        self.registry.remove(handle)
    }

    pub fn is_authenticated(&self, handle: u64) -> bool {
        self.registry
            .find_by_handle(handle)
            .is_some_and(|c| c.status == ClientStatus::Authenticated)
    }

    pub fn bound_username(&self, handle: u64) -> Option<&str> {
        self.registry
            .find_by_handle(handle)
            .filter(|c| c.status == ClientStatus::Authenticated)
            .and_then(ClientEntry::username)
    }

    pub fn bound_user_id(&self, handle: u64) -> Option<u64> {
        self.registry
            .find_by_handle(handle)
            .filter(|c| c.status == ClientStatus::Authenticated)
            .and_then(|c| c.identity.as_ref())
            .map(|id| id.user_id)
    }

    pub fn is_user_online(&self, name: &str) -> bool {
        self.registry.find_by_username(name).is_some()
    }

    /// Usernames of every Authenticated client, in snapshot order.
    pub fn online_users(&self) -> Vec<String> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|c| c.status == ClientStatus::Authenticated)
            .filter_map(|c| c.username)
            .collect()
    }
}
