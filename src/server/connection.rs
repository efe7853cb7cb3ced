// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Result, anyhow};
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::codec::FrameSplitter;

pub(super) const READ_CHUNK: usize = 4096;

/// Connection-side events delivered to the server loop. Channel FIFO keeps
/// per-sender frames in send order.
#[derive(Debug)]
pub enum ConnEvent {
    /// One complete frame (terminator stripped) read from the connection.
    Frame(u64, Bytes),
    /// The transport reached EOF or failed; deregister the handle.
    Closed(u64),
}

/// Races a socket operation against its deadline and the shutdown token.
pub(super) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let deadlined = async {
        match timeout(limit, fut).await {
            Ok(done) => done.map_err(anyhow::Error::from),
            Err(_) => Err(anyhow!("{label}: no progress within {limit:?}")),
        }
    };

    tokio::select! {
        res = deadlined => res,
        _ = cancel.cancelled() => Err(anyhow!("{label}: connection cancelled")),
    }
}

/// Owns the read half: accumulates bytes, re-frames them on unescaped `\n`
/// and forwards complete frames to the server loop. EOF on an async read is
/// unambiguous peer-closed; would-block never surfaces here.
pub(super) async fn run_reader(
    handle: u64,
    mut read: OwnedReadHalf,
    events: UnboundedSender<ConnEvent>,
    cancel: CancellationToken,
) {
    let mut splitter = FrameSplitter::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            res = read.read(&mut chunk) => match res {
                Ok(0) => {
                    debug!(handle, "peer closed");
                    let _ = events.send(ConnEvent::Closed(handle));
                    break;
                },
                Ok(n) => n,
                Err(e) => {
                    debug!(handle, error = %e, "read failed");
                    let _ = events.send(ConnEvent::Closed(handle));
                    break;
                },
            },
        };
        splitter.extend(&chunk[..n]);
        while let Some(frame) = splitter.next_frame() {
            if events.send(ConnEvent::Frame(handle, frame)).is_err() {
                return;
            }
        }
    }
}

/// Owns the write half: drains the outbound channel into the socket. Short
/// writes retry inside `write_all`; a timeout or error marks the peer dead.
pub(super) async fn run_writer(
    handle: u64,
    mut write: OwnedWriteHalf,
    mut outbound: UnboundedReceiver<Bytes>,
    events: UnboundedSender<ConnEvent>,
    write_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                // The registry entry is gone; flush ends here.
                None => break,
            },
        };
        if let Err(e) =
            io_with_timeout("write frame", write.write_all(&frame), write_timeout, &cancel)
                .await
        {
            warn!(handle, error = %e, "write failed");
            let _ = events.send(ConnEvent::Closed(handle));
            break;
        }
    }
    let _ = write.shutdown().await;
}
