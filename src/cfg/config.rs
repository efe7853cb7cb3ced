// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::utils::is_valid_username;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// Listener and runtime knobs.
    #[serde(default)]
    pub server: ServerConfig,
    /// Users seeded into the in-memory credential store at startup.
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub host: String,
    /// Listen port; an argv port overrides this value.
    pub port: u16,
    /// Accepts above this count are refused by closing the socket.
    pub max_clients: usize,
    /// When false, unauthenticated connections may send MSG/BROADCAST/STATUS.
    pub require_auth: bool,
    /// Parsed for compatibility; no encryption layer is wired up yet.
    pub enable_encryption: bool,
    #[serde(with = "serde_secs")]
    /// Deadline for flushing one frame to a client socket.
    pub write_timeout: Duration,
    #[serde(with = "serde_opt_secs")]
    /// Connections idle longer than this are closed by the periodic sweep.
    /// Absent means no idle enforcement.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_clients: 100,
            require_auth: true,
            enable_encryption: false,
            write_timeout: Duration::from_secs(10),
            idle_timeout: None,
        }
    }
}

/// One pre-registered user.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UserSeed {
    pub username: String,
    pub password: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants before the server touches the config.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(self.server.max_clients >= 1, "max_clients must be >= 1");
        ensure!(
            self.server.write_timeout > Duration::ZERO,
            "write_timeout must be positive"
        );
        if let Some(idle) = self.server.idle_timeout {
            ensure!(idle > Duration::ZERO, "idle_timeout must be positive");
        }
        for seed in &self.users {
            ensure!(
                is_valid_username(&seed.username),
                "user seed `{}` is not a valid username",
                seed.username
            );
        }
        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Same layout for an optional number of seconds.
mod serde_opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
