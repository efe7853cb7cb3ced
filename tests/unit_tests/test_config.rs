// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use chat_server_rs::cfg::config::Config;

#[test]
fn test_builtin_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.server.max_clients, 100);
    assert!(cfg.server.require_auth);
    assert!(!cfg.server.enable_encryption);
    assert_eq!(cfg.server.idle_timeout, None);
    assert!(cfg.users.is_empty());
}

#[test]
fn test_yaml_round_trip_with_partial_keys() -> Result<()> {
    let yaml = r#"
server:
  port: 9099
  max_clients: 5
  require_auth: false
  write_timeout: 3
  idle_timeout: 60
users:
  - username: alice
    password: alice123
  - username: dave
    password: dave123
    active: false
"#;
    let mut cfg: Config = serde_yaml::from_str(yaml)?;
    cfg.validate_and_normalize()?;

    // Unset keys fall back to the defaults.
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9099);
    assert_eq!(cfg.server.max_clients, 5);
    assert!(!cfg.server.require_auth);
    assert_eq!(cfg.server.write_timeout, Duration::from_secs(3));
    assert_eq!(cfg.server.idle_timeout, Some(Duration::from_secs(60)));

    assert_eq!(cfg.users.len(), 2);
    assert!(cfg.users[0].active);
    assert!(!cfg.users[1].active);
    Ok(())
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.server.max_clients = 0;
    assert!(cfg.validate_and_normalize().is_err());

    let mut cfg = Config::default();
    cfg.server.write_timeout = Duration::ZERO;
    assert!(cfg.validate_and_normalize().is_err());

    let mut cfg = Config::default();
    cfg.server.idle_timeout = Some(Duration::ZERO);
    assert!(cfg.validate_and_normalize().is_err());

    let yaml = r#"
users:
  - username: "bad name"
    password: x
"#;
    let mut cfg: Config = serde_yaml::from_str(yaml).expect("parse");
    assert!(cfg.validate_and_normalize().is_err());
}
