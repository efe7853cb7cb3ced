// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use chat_server_rs::{
    cfg::{
        cli::{port_override, resolve_config_path},
        config::Config,
        logger::init_logger,
    },
    server::server::ChatServer,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "config/server.yaml";
const DEFAULT_LOGGER_CONFIG: &str = "config/logger.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let logger_config = resolve_config_path(DEFAULT_LOGGER_CONFIG).ok();
    let _logger_guard = init_logger(logger_config.as_deref())?;

    // Missing config file means built-in defaults; a present but broken one
    // is a startup failure.
    let mut cfg = match resolve_config_path(DEFAULT_CONFIG) {
        Ok(path) => Config::load_from_file(path).context("failed to load server config")?,
        Err(_) => Config::default(),
    };
    if let Some(port) = port_override(std::env::args())? {
        cfg.server.port = port;
    }

    let (server, addr) = ChatServer::bind(cfg).await.context("server init failed")?;
    info!(%addr, "listening");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    server.run(cancel).await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            },
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
