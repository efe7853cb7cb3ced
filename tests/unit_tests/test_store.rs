// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use chat_server_rs::store::{CredentialStore, FIRST_USER_ID, StoreError};

#[test]
fn test_identities_are_monotonic_from_floor() -> Result<()> {
    let mut store = CredentialStore::new();
    let a = store.add("alice", "alice123")?;
    let b = store.add("bob", "bob123")?;
    assert_eq!(a, FIRST_USER_ID);
    assert_eq!(b, FIRST_USER_ID + 1);
    assert_eq!(store.len(), 2);
    Ok(())
}

#[test]
fn test_duplicate_and_invalid_names_are_rejected() -> Result<()> {
    let mut store = CredentialStore::new();
    store.add("alice", "alice123")?;
    assert_eq!(
        store.add("alice", "other"),
        Err(StoreError::NameTaken("alice".to_string()))
    );
    assert_eq!(
        store.add("bad name", "x"),
        Err(StoreError::InvalidName("bad name".to_string()))
    );
    assert_eq!(
        store.add(&"x".repeat(32), "x"),
        Err(StoreError::InvalidName("x".repeat(32)))
    );
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn test_lookup_by_name_and_id() -> Result<()> {
    let mut store = CredentialStore::new();
    let id = store.add("alice", "alice123")?;
    assert_eq!(store.lookup_by_name("alice").map(|u| u.user_id), Some(id));
    assert_eq!(
        store.lookup_by_id(id).map(|u| u.username.as_str()),
        Some("alice")
    );
    assert!(store.lookup_by_name("nobody").is_none());
    assert!(store.lookup_by_id(9999).is_none());
    Ok(())
}

#[test]
fn test_authenticate_matches_byte_for_byte() -> Result<()> {
    let mut store = CredentialStore::new();
    store.add("alice", "alice123")?;
    assert!(store.authenticate("alice", "alice123"));
    assert!(!store.authenticate("alice", "alice12"));
    assert!(!store.authenticate("alice", "ALICE123"));
    assert!(!store.authenticate("nobody", "alice123"));
    Ok(())
}

#[test]
fn test_inactive_user_cannot_authenticate() -> Result<()> {
    let mut store = CredentialStore::new();
    store.add("alice", "alice123")?;
    assert!(store.set_active("alice", false));
    assert!(!store.authenticate("alice", "alice123"));
    assert!(store.set_active("alice", true));
    assert!(store.authenticate("alice", "alice123"));
    assert!(!store.set_active("nobody", false));
    Ok(())
}
