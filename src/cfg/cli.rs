// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};

/// Expands a possibly-relative config path and fails when nothing exists
/// there.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let given = Path::new(rel);
    let absolute = if given.is_relative() {
        std::env::current_dir()
            .context("working directory is not accessible")?
            .join(given)
    } else {
        given.to_path_buf()
    };

    absolute
        .canonicalize()
        .with_context(|| format!("config path {} does not resolve", absolute.display()))
}

/// `server [port]` — the lone positional argument overrides the configured
/// listen port.
pub fn port_override<I: Iterator<Item = String>>(mut args: I) -> Result<Option<u16>> {
    let _argv0 = args.next();
    match args.next() {
        None => Ok(None),
        Some(raw) => {
            let port = raw
                .parse::<u16>()
                .with_context(|| format!("invalid port argument `{raw}`"))?;
            ensure!(args.next().is_none(), "usage: server [port]");
            Ok(Some(port))
        },
    }
}
