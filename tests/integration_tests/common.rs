// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, bail, ensure};
use chat_server_rs::{
    cfg::config::{Config, UserSeed},
    server::server::ChatServer,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

/// Binds on an ephemeral loopback port and runs the server in a background
/// task.
pub async fn start_server(
    users: &[(&str, &str)],
    require_auth: bool,
    max_clients: usize,
) -> Result<TestServer> {
    let mut cfg = Config::default();
    cfg.server.host = "127.0.0.1".to_string();
    cfg.server.port = 0;
    cfg.server.require_auth = require_auth;
    cfg.server.max_clients = max_clients;
    cfg.users = users
        .iter()
        .map(|(name, password)| UserSeed {
            username: (*name).to_string(),
            password: (*password).to_string(),
            active: true,
        })
        .collect();

    let (server, addr) = ChatServer::bind(cfg).await?;
    let cancel = CancellationToken::new();
    let task = tokio::spawn(server.run(cancel.clone()));
    Ok(TestServer { addr, cancel, task })
}

impl TestServer {
    /// Requests shutdown and waits for a clean exit.
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        timeout(RECV_TIMEOUT, self.task)
            .await
            .context("server did not stop in time")?
            .context("server task panicked")?
    }
}

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (r, w) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(r),
            writer: w,
        })
    }

    pub async fn send(&mut self, frame: &str) -> Result<()> {
        self.writer.write_all(frame.as_bytes()).await?;
        Ok(())
    }

    /// Next frame, terminator stripped. Fails on timeout or EOF.
    pub async fn recv(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .context("timed out waiting for a frame")??;
        ensure!(n > 0, "connection closed by the server");
        Ok(line.trim_end_matches('\n').to_string())
    }

    /// Asserts the server closed this connection.
    pub async fn expect_eof(&mut self) -> Result<()> {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .context("timed out waiting for EOF")??;
        ensure!(n == 0, "expected EOF, got {line:?}");
        Ok(())
    }

    /// Asserts nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        let mut line = String::new();
        match timeout(window, self.reader.read_line(&mut line)).await {
            Err(_) => Ok(()),
            Ok(Ok(0)) => bail!("connection closed while expecting silence"),
            Ok(Ok(_)) => bail!("unexpected frame {line:?}"),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    pub async fn login(&mut self, user: &str, credential: &str) -> Result<String> {
        self.send(&format!(
            "LOGIN|{user}|server|2024-01-15 10:30:00|{credential}\n"
        ))
        .await?;
        self.recv().await
    }
}
