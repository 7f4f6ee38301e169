//! Remote-control command server.
//!
//! A client opens a TCP connection and sends newline-delimited JSON
//! commands; the server drives the local desktop (pointer, keyboard,
//! screen capture, files, power actions) and replies with one JSON line
//! per command, except for high-frequency pointer commands.

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod files;
pub mod frame;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod telemetry;
