//! Per-connection request loop.
//!
//! Requests are newline-delimited JSON. Lines that are not valid UTF-8 or
//! not valid JSON are logged and skipped without a reply. Pointer commands
//! never produce a reply, even when they fail.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::protocol::{Command, CommandError, Response};
use crate::stream::StreamSessions;

use super::listener::tune_stream;
use super::{ConnectionId, ConnectionRegistry, LISTENER_TARGET};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// State shared by every connection handler.
#[derive(Debug)]
pub(crate) struct ConnectionContext {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) registry: Arc<ConnectionRegistry>,
}

/// Releases per-connection state however the handler exits.
struct ConnectionGuard {
    id: ConnectionId,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    streams: Arc<StreamSessions>,
    handled: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.streams.stop(self.id);
        self.registry.remove(self.id);
        info!(
            target: LISTENER_TARGET,
            connection = %self.id,
            peer = %self.peer,
            commands = self.handled,
            "client disconnected"
        );
    }
}

/// Serves one accepted connection until the peer leaves, a write fails, or
/// the server signals shutdown.
pub(crate) async fn serve(
    context: Arc<ConnectionContext>,
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    close: Arc<Notify>,
) {
    let mut guard = ConnectionGuard {
        id,
        peer,
        registry: Arc::clone(&context.registry),
        streams: Arc::clone(context.dispatcher.streams()),
        handled: 0,
    };
    info!(target: LISTENER_TARGET, connection = %id, peer = %peer, "client connected");

    tune_stream(&stream, context.config.connection_buffer_bytes);
    let (mut reader, mut writer) = stream.into_split();
    let mut pending = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        let read = tokio::select! {
            () = close.notified() => {
                debug!(target: LISTENER_TARGET, connection = %id, "closing for shutdown");
                break;
            }
            read = tokio::time::timeout(context.config.idle_timeout, reader.read(&mut chunk)) => read,
        };
        let received = match read {
            // Idle clients are kept; the timeout only bounds each wait.
            Err(_elapsed) => continue,
            Ok(Ok(0)) => break,
            Ok(Ok(received)) => received,
            Ok(Err(error)) => {
                debug!(target: LISTENER_TARGET, connection = %id, error = %error, "read failed");
                break;
            }
        };
        pending.extend_from_slice(&chunk[..received]);

        let answered = answer_lines(
            &context.dispatcher,
            id,
            &mut pending,
            &mut writer,
            &mut guard.handled,
        )
        .await;
        if let Err(error) = answered {
            debug!(target: LISTENER_TARGET, connection = %id, error = %error, "write failed");
            return;
        }

        if pending.len() > context.config.max_line_bytes {
            warn!(
                target: LISTENER_TARGET,
                connection = %id,
                buffered = pending.len(),
                limit = context.config.max_line_bytes,
                "request line too long; dropping connection"
            );
            break;
        }
    }
}

/// Runs every complete line in `pending` and writes the replies. Stops at the
/// first failed write; the caller then drops the connection.
async fn answer_lines<W: AsyncWrite + Unpin>(
    dispatcher: &Dispatcher,
    id: ConnectionId,
    pending: &mut Vec<u8>,
    writer: &mut W,
    handled: &mut u64,
) -> io::Result<()> {
    while let Some(end) = pending.iter().position(|byte| *byte == b'\n') {
        let line: Vec<u8> = pending.drain(..=end).collect();
        let Some(response) = handle_line(dispatcher, id, &line[..end]).await else {
            continue;
        };
        *handled += 1;
        let bytes = match response.to_line() {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(target: LISTENER_TARGET, connection = %id, error = %error, "response encoding failed");
                continue;
            }
        };
        writer.write_all(&bytes).await?;
    }
    Ok(())
}

/// Decodes and runs one request line. `None` means nothing is written back.
async fn handle_line(dispatcher: &Dispatcher, id: ConnectionId, line: &[u8]) -> Option<Response> {
    let Ok(text) = std::str::from_utf8(line) else {
        warn!(target: LISTENER_TARGET, connection = %id, "skipping line that is not UTF-8");
        return None;
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(error) => {
            warn!(target: LISTENER_TARGET, connection = %id, error = %error, "skipping malformed JSON");
            return None;
        }
    };

    let command = match Command::from_value(value) {
        Ok(command) => command,
        Err(error) => return rejection(id, &error),
    };
    let kind = command.kind();
    if kind.is_fire_and_forget() {
        trace!(target: LISTENER_TARGET, connection = %id, command = %kind, "command received");
    } else {
        info!(target: LISTENER_TARGET, connection = %id, command = %kind, "command received");
    }

    let response = dispatcher.dispatch(id, command).await;
    (!kind.is_fire_and_forget()).then_some(response)
}

fn rejection(id: ConnectionId, error: &CommandError) -> Option<Response> {
    warn!(target: LISTENER_TARGET, connection = %id, error = %error, "rejecting command");
    match error.kind() {
        Some(kind) if kind.is_fire_and_forget() => None,
        _ => Some(Response::error(error.to_string())),
    }
}
