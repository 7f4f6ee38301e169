//! TCP front end: binds the listener, tracks live connections and drives
//! one handler task per client.

mod errors;
mod handler;
mod listener;
mod registry;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::capability::Capabilities;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::files::FileService;
use crate::stream::StreamSessions;

pub use errors::ListenerError;
pub use registry::{ConnectionId, ConnectionRegistry};

use handler::ConnectionContext;

/// Tracing target for listener and connection events.
pub(crate) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Stops a running [`Server`]. Cloneable and usable before `run` starts.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stops accepting and closes every live connection.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }
}

/// A bound server, ready to run.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<ConnectionContext>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Binds `config.host:config.port` and wires the services every
    /// connection shares.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        config: ServerConfig,
        capabilities: Arc<dyn Capabilities>,
    ) -> Result<Self, ListenerError> {
        let listener = listener::bind_tcp(&config.host, config.port, config.listener_buffer_bytes)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Runtime { source })?;

        let files = FileService::new(
            config.home_dir.clone(),
            config.upload_dir.clone(),
            config.download_roots.clone(),
        );
        let dispatcher = Dispatcher::new(capabilities, files, Arc::new(StreamSessions::new()));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            listener,
            local_addr,
            context: Arc::new(ConnectionContext {
                config: Arc::new(config),
                dispatcher,
                registry: Arc::new(ConnectionRegistry::new()),
            }),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown),
        }
    }

    /// Live connections, for inspection.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.context.registry)
    }

    /// Serves clients until [`ShutdownHandle::shutdown`] is called, then
    /// closes every connection and waits for their handlers.
    pub async fn run(self) {
        info!(
            target: LISTENER_TARGET,
            address = %self.local_addr,
            upload_dir = %self.context.config.upload_dir.display(),
            "server listening"
        );
        let stopped = wait_for_shutdown(self.shutdown.subscribe());
        listener::accept_loop(self.listener, self.context, stopped).await;
    }
}

async fn wait_for_shutdown(mut receiver: watch::Receiver<bool>) {
    while !*receiver.borrow_and_update() {
        if receiver.changed().await.is_err() {
            return;
        }
    }
}
