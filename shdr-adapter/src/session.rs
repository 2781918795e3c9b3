//! Per-agent connection handling.
//!
//! Each accepted socket runs two cooperating loops:
//!
//! 1. **Write loop** — drains the client's registry queue and writes each
//!    line (plus `LF`) to the socket under the configured write deadline.
//! 2. **Read loop** — reads lines under a deadline of heartbeat + grace,
//!    answering `* PING` with `* PONG <heartbeat_ms>` through the same queue
//!    so heartbeats stay in FIFO order with data lines.
//!
//! Either loop ending tears the session down: the client is unregistered and
//! `AgentDisconnected` is emitted exactly once, from the read side. The
//! adapter does not initiate pings; heartbeat is purely reactive.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use shdr_protocol::codec::{decode_inbound, pong_line, InboundLine};

use crate::event::{AdapterEvent, ClientId, EventBus};
use crate::registry::ClientRegistry;

/// Shared context handed to every session.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub registry: ClientRegistry,
    pub events: EventBus,
    pub heartbeat_ms: u64,
    pub read_deadline: Duration,
    pub write_timeout: Duration,
    pub shutdown: watch::Receiver<bool>,
}

/// Drive one agent connection to completion.
///
/// `rx` is the write-queue receiver obtained when the client was registered;
/// the caller has already queued the reconnect replay into it.
pub(crate) async fn run_session(
    stream: TcpStream,
    client_id: ClientId,
    rx: mpsc::Receiver<String>,
    ctx: SessionContext,
) {
    let (read_half, write_half) = stream.into_split();

    let write_handle = tokio::spawn(write_loop(
        write_half,
        rx,
        client_id,
        ctx.registry.clone(),
        ctx.events.clone(),
        ctx.write_timeout,
        ctx.shutdown.clone(),
    ));

    read_loop(read_half, client_id, &ctx).await;

    // Unregistering drops the queue sender; the write loop drains what is
    // already queued and then exits on its own.
    ctx.registry.unregister(client_id);
    let _ = write_handle.await;

    ctx.events
        .emit(AdapterEvent::AgentDisconnected { client_id });

    #[cfg(feature = "tracing")]
    tracing::info!(client_id, "agent session ended");
}

// ════════════════════════════════════════════════════════════════════
// Write loop
// ════════════════════════════════════════════════════════════════════

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<String>,
    client_id: ClientId,
    registry: ClientRegistry,
    events: EventBus,
    write_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            maybe = rx.recv() => match maybe {
                Some(line) => line,
                None => break,
            },
        };

        let mut bytes = line.into_bytes();
        bytes.push(b'\n');

        let result = timeout(write_timeout, writer.write_all(&bytes)).await;
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("write timed out after {:?}", write_timeout)),
        };

        if let Some(message) = failure {
            #[cfg(feature = "tracing")]
            tracing::warn!(client_id, %message, "write failed; closing client");
            registry.unregister(client_id);
            events.emit(AdapterEvent::SendError { client_id, message });
            break;
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Read loop
// ════════════════════════════════════════════════════════════════════

async fn read_loop(read_half: OwnedReadHalf, client_id: ClientId, ctx: &SessionContext) {
    let mut reader = BufReader::new(read_half);
    let mut shutdown = ctx.shutdown.clone();
    let mut buf = String::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = shutdown.changed() => break,
            read = timeout(ctx.read_deadline, reader.read_line(&mut buf)) => read,
        };

        match read {
            Ok(Ok(0)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(client_id, "agent closed the connection");
                break;
            }
            Ok(Ok(_)) => handle_inbound(&buf, client_id, ctx),
            Ok(Err(_e)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(client_id, error = %_e, "read error");
                break;
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    client_id,
                    deadline = ?ctx.read_deadline,
                    "no heartbeat within deadline; closing client"
                );
                break;
            }
        }
    }
}

fn handle_inbound(text: &str, client_id: ClientId, ctx: &SessionContext) {
    for line in decode_inbound(text) {
        match line {
            InboundLine::Ping => {
                ctx.events.emit(AdapterEvent::PingReceived { client_id });
                let pong = pong_line(ctx.heartbeat_ms);
                // The PONG shares the data queue, so it cannot overtake or be
                // overtaken by observation lines.
                if ctx.registry.send_to(client_id, &[pong]).is_ok() {
                    ctx.events.emit(AdapterEvent::PongSent { client_id });
                }
            }
            InboundLine::Unexpected(_text) => {
                // Protocol violations are ignored; the connection stays up.
                #[cfg(feature = "tracing")]
                tracing::warn!(client_id, line = %_text, "unexpected line from agent");
            }
        }
    }
}
