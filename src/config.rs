//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5555;

/// Runtime settings for [`crate::server::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// A read that sees no data for this long is retried, not treated as a
    /// disconnect.
    pub idle_timeout: Duration,
    /// Send/receive buffer size requested on the listening socket.
    pub listener_buffer_bytes: usize,
    /// Send/receive buffer size requested on each accepted connection.
    pub connection_buffer_bytes: usize,
    /// Longest request line accepted before the connection is dropped.
    pub max_line_bytes: usize,
    /// Directory browsed when `browse_files` has no path.
    pub home_dir: PathBuf,
    /// Destination of `upload_file`.
    pub upload_dir: PathBuf,
    /// Directories scanned by `list_files`.
    pub download_roots: Vec<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let upload_dir = dirs::download_dir().unwrap_or_else(|| home_dir.join("Downloads"));
        let download_roots = vec![
            upload_dir.clone(),
            dirs::document_dir().unwrap_or_else(|| home_dir.join("Documents")),
            dirs::desktop_dir().unwrap_or_else(|| home_dir.join("Desktop")),
            dirs::picture_dir().unwrap_or_else(|| home_dir.join("Pictures")),
        ];
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: Duration::from_secs(10),
            listener_buffer_bytes: 2 * 1024 * 1024,
            connection_buffer_bytes: 1024 * 1024,
            max_line_bytes: 64 * 1024 * 1024,
            home_dir,
            upload_dir,
            download_roots,
        }
    }
}

impl ServerConfig {
    /// Roots every filesystem location under `root`, for tests and sandboxes.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let upload_dir = root.join("Downloads");
        Self {
            download_roots: vec![
                upload_dir.clone(),
                root.join("Documents"),
                root.join("Desktop"),
                root.join("Pictures"),
            ],
            upload_dir,
            home_dir: root,
            ..Self::default()
        }
    }

    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
