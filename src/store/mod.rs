// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-memory credential store. Pluggable lookup behind a narrow surface so a
//! future move to persistent storage or salted hashing stays mechanical.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::utils::is_valid_username;

/// User identities are issued monotonically starting here and never reused.
pub const FIRST_USER_ID: u64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("username `{0}` is already registered")]
    NameTaken(String),
    #[error("username `{0}` is not a valid identifier")]
    InvalidName(String),
}

/// A registered user. The credential is private; comparison happens only
/// inside [`CredentialStore::authenticate`].
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    credential: String,
    pub user_id: u64,
    pub registered_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug)]
pub struct CredentialStore {
    users: HashMap<String, User>,
    next_user_id: u64,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            next_user_id: FIRST_USER_ID,
        }
    }

    /// Registers a user and returns the issued identity. Fails on a duplicate
    /// or malformed username.
    pub fn add(&mut self, name: &str, credential: &str) -> Result<u64, StoreError> {
        if !is_valid_username(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        if self.users.contains_key(name) {
            return Err(StoreError::NameTaken(name.to_string()));
        }
        let user_id = self.next_user_id;
        self.next_user_id += 1;
        self.users.insert(name.to_string(), User {
            username: name.to_string(),
            credential: credential.to_string(),
            user_id,
            registered_at: Utc::now(),
            active: true,
        });
        Ok(user_id)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn lookup_by_id(&self, user_id: u64) -> Option<&User> {
        self.users.values().find(|u| u.user_id == user_id)
    }

    /// True iff the user exists, is active, and the credential matches
    /// byte-for-byte. The comparison lives only here so swapping in salted
    /// hashes later touches a single function.
    pub fn authenticate(&self, name: &str, credential: &str) -> bool {
        self.users
            .get(name)
            .is_some_and(|u| u.active && u.credential.as_bytes() == credential.as_bytes())
    }

    /// Flips the active flag; returns false when the user is unknown.
    pub fn set_active(&mut self, name: &str, active: bool) -> bool {
        match self.users.get_mut(name) {
            Some(user) => {
                user.active = active;
                true
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
