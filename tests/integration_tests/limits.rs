// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use serial_test::serial;
use tokio::time::sleep;

use crate::integration_tests::common::{TestClient, start_server};

#[tokio::test]
#[serial]
async fn accept_above_max_clients_is_refused() -> Result<()> {
    let server = start_server(&[("alice", "alice123")], true, 1).await?;
    let mut first = TestClient::connect(server.addr).await?;

    // The reply proves the first connection is registered before the second
    // one reaches the accept path.
    first.login("alice", "alice123").await?;

    let mut second = TestClient::connect(server.addr).await?;
    second.expect_eof().await?;

    // The first connection is unaffected.
    first
        .send("STATUS|alice|server|2024-01-15 10:36:00|\n")
        .await?;
    let reply = first.recv().await?;
    assert!(reply.contains("clients=1"), "got {reply}");

    server.stop().await
}

#[tokio::test]
#[serial]
async fn slot_is_freed_on_disconnect() -> Result<()> {
    let server = start_server(&[("alice", "alice123")], true, 1).await?;

    let first = TestClient::connect(server.addr).await?;
    drop(first);

    // Give the event loop a tick to process the EOF before reconnecting.
    let mut second = TestClient::connect(server.addr).await?;
    let mut attempts = 0;
    loop {
        match second.login("alice", "alice123").await {
            Ok(reply) => {
                assert!(reply.ends_with("|0|Login successful"), "got {reply}");
                break;
            },
            Err(_) if attempts < 10 => {
                attempts += 1;
                sleep(Duration::from_millis(50)).await;
                second = TestClient::connect(server.addr).await?;
            },
            Err(e) => return Err(e),
        }
    }

    server.stop().await
}
