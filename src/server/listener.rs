//! Binding and the accept loop.

use std::future::Future;
use std::io;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::handler::{self, ConnectionContext};
use super::{LISTENER_TARGET, ListenerError};

const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const LISTEN_BACKLOG: i32 = 128;

/// Resolves `host:port` and binds a reusable, non-blocking TCP listener.
///
/// Buffer sizes are requests; a kernel that refuses them is not an error.
///
/// # Panics
///
/// Panics when called outside a tokio runtime with IO enabled.
pub(super) fn bind_tcp(
    host: &str,
    port: u16,
    buffer_bytes: usize,
) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_string(),
        port,
    })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|source| ListenerError::Socket { addr, source })?;
    socket
        .set_reuse_address(true)
        .map_err(|source| ListenerError::Socket { addr, source })?;
    request_buffers(&socket, buffer_bytes);
    socket
        .bind(&addr.into())
        .and_then(|()| socket.listen(LISTEN_BACKLOG))
        .map_err(|source| ListenerError::BindTcp { addr, source })?;
    socket
        .set_nonblocking(true)
        .map_err(|source| ListenerError::Socket { addr, source })?;

    let listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(listener).map_err(|source| ListenerError::Runtime { source })
}

/// Applies TCP_NODELAY and buffer sizes to an accepted stream, best effort.
pub(super) fn tune_stream(stream: &TcpStream, buffer_bytes: usize) {
    if let Err(error) = stream.set_nodelay(true) {
        debug!(target: LISTENER_TARGET, error = %error, "could not disable Nagle");
    }
    request_buffers(&SockRef::from(stream), buffer_bytes);
}

fn request_buffers(socket: &Socket, bytes: usize) {
    if let Err(error) = socket
        .set_recv_buffer_size(bytes)
        .and_then(|()| socket.set_send_buffer_size(bytes))
    {
        warn!(target: LISTENER_TARGET, error = %error, bytes, "socket buffer size refused");
    }
}

/// Accepts connections until `stopped` completes, then waits for every
/// handler to finish after signalling them to close.
pub(super) async fn accept_loop(
    listener: TcpListener,
    context: Arc<ConnectionContext>,
    stopped: impl Future<Output = ()>,
) {
    let mut handlers = JoinSet::new();
    let mut last_error = None::<io::ErrorKind>;
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            () = &mut stopped => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    last_error = None;
                    // Registered before spawning so shutdown always reaches it.
                    let (id, close) = context.registry.register(peer);
                    handlers.spawn(handler::serve(Arc::clone(&context), stream, peer, id, close));
                }
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: LISTENER_TARGET, error = %error, "socket accept error");
                    }
                    last_error = Some(kind);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            },
            Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                report_handler_exit(finished);
            }
        }
    }

    drop(listener);
    let closing = context.registry.close_all();
    info!(target: LISTENER_TARGET, connections = closing, "server stopping");
    while let Some(finished) = handlers.join_next().await {
        report_handler_exit(finished);
    }
    info!(target: LISTENER_TARGET, "server stopped");
}

fn report_handler_exit(finished: Result<(), tokio::task::JoinError>) {
    if let Err(error) = finished {
        warn!(target: LISTENER_TARGET, error = %error, "connection handler aborted");
    }
}
