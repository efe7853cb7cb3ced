// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc::{self, UnboundedSender},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::Config,
    server::{
        connection::{self, ConnEvent},
        handler::CommandHandler,
        session::SessionManager,
    },
    store::CredentialStore,
};

/// Interval for the periodic tick that runs idle sweeps.
const SWEEP_PERIOD: Duration = Duration::from_secs(5);

/// The server aggregate: configuration, listener, and all protocol state.
/// Connection events are processed sequentially by one task, so the registry
/// and the counters are serialized by construction.
pub struct ChatServer {
    cfg: Config,
    listener: TcpListener,
    handler: CommandHandler,
    next_handle: u64,
}

impl ChatServer {
    /// Seeds the credential store from the config and binds the listener.
    pub async fn bind(cfg: Config) -> Result<(Self, SocketAddr)> {
        let mut store = CredentialStore::new();
        for seed in &cfg.users {
            let user_id = store
                .add(&seed.username, &seed.password)
                .with_context(|| format!("bad user seed `{}`", seed.username))?;
            if !seed.active {
                store.set_active(&seed.username, false);
            }
            debug!(user = %seed.username, user_id, active = seed.active, "user seeded");
        }

        let listener = TcpListener::bind((cfg.server.host.as_str(), cfg.server.port))
            .await
            .with_context(|| {
                format!("failed to bind {}:{}", cfg.server.host, cfg.server.port)
            })?;
        let addr = listener.local_addr().context("listener has no local address")?;

        let handler = CommandHandler::new(SessionManager::new(store), cfg.server.require_auth);
        Ok((
            Self {
                cfg,
                listener,
                handler,
                next_handle: 1,
            },
            addr,
        ))
    }

    /// Runs until `cancel` fires, then closes every client and returns.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let ChatServer {
            cfg,
            listener,
            mut handler,
            mut next_handle,
        } = self;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ConnEvent>();
        let mut sweep = tokio::time::interval(SWEEP_PERIOD);
        info!(
            max_clients = cfg.server.max_clients,
            require_auth = cfg.server.require_auth,
            "chat server running"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => accept_connection(
                        &cfg,
                        &mut handler,
                        &mut next_handle,
                        stream,
                        peer,
                        &events_tx,
                        &cancel,
                    ),
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(event) = events_rx.recv() => match event {
                    ConnEvent::Frame(handle, frame) => {
                        for dead in handler.handle_raw(handle, &frame) {
                            drop_connection(&mut handler, dead);
                        }
                    },
                    ConnEvent::Closed(handle) => drop_connection(&mut handler, handle),
                },
                _ = sweep.tick() => sweep_idle(&cfg, &mut handler),
            }
        }

        for handle in handler.sessions().registry().handles() {
            drop_connection(&mut handler, handle);
        }
        info!("chat server stopped");
        Ok(())
    }
}

fn accept_connection(
    cfg: &Config,
    handler: &mut CommandHandler,
    next_handle: &mut u64,
    stream: TcpStream,
    peer: SocketAddr,
    events: &UnboundedSender<ConnEvent>,
    cancel: &CancellationToken,
) {
    if handler.sessions().registry().count() >= cfg.server.max_clients {
        // Refused before any protocol exchange; no reply is possible.
        warn!(%peer, "connection refused, client table full");
        drop(stream);
        return;
    }
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "set_nodelay failed");
    }

    let handle = *next_handle;
    *next_handle += 1;

    let (read, write) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let client_id = handler
        .sessions_mut()
        .registry_mut()
        .add(handle, peer, out_tx);
    info!(handle, client_id, %peer, "client connected");

    tokio::spawn(connection::run_reader(
        handle,
        read,
        events.clone(),
        cancel.child_token(),
    ));
    tokio::spawn(connection::run_writer(
        handle,
        write,
        out_rx,
        events.clone(),
        cfg.server.write_timeout,
        cancel.child_token(),
    ));
}

fn drop_connection(handler: &mut CommandHandler, handle: u64) {
    if let Some(entry) = handler.sessions_mut().close(handle) {
        info!(
            handle,
            client_id = entry.client_id,
            user = entry.username().unwrap_or("-"),
            "client disconnected"
        );
    }
}

fn sweep_idle(cfg: &Config, handler: &mut CommandHandler) {
    let Some(idle) = cfg.server.idle_timeout else {
        return;
    };
    let Ok(window) = chrono::Duration::from_std(idle) else {
        return;
    };
    let cutoff = Utc::now() - window;
    for handle in handler.sessions().registry().idle_handles(cutoff) {
        info!(handle, "closing idle connection");
        drop_connection(handler, handle);
    }
}
