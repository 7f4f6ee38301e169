use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use deskremote::config::{DEFAULT_HOST, DEFAULT_PORT};
use deskremote::telemetry::{DEFAULT_LOG_FILTER, LogFormat, TelemetryConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub logging: LoggingArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct LoggingArgs {
    /// Tracing filter directives, e.g. `info,deskremote::server=debug`
    #[arg(long, global = true, env = "DESKREMOTE_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
    /// Log output format
    #[arg(long, global = true, value_enum, env = "DESKREMOTE_LOG_FORMAT", default_value_t)]
    pub log_format: LogFormat,
    /// Append logs to this file instead of stderr
    #[arg(long, global = true, env = "DESKREMOTE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            filter: self.log_filter.clone(),
            format: self.log_format,
            log_file: self.log_file.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Accept remote-control connections
    Serve {
        /// Address to listen on
        #[arg(long, env = "DESKREMOTE_HOST", default_value = DEFAULT_HOST)]
        host: String,
        /// Port to listen on
        #[arg(long, short, env = "DESKREMOTE_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Directory that receives uploads (defaults to the Downloads folder)
        #[arg(long, env = "DESKREMOTE_UPLOAD_DIR")]
        upload_dir: Option<PathBuf>,
        /// Record actions and serve a generated screen instead of touching
        /// this machine
        #[arg(long)]
        synthetic: bool,
    },
    /// Send JSON commands to a server and print the replies
    Send {
        /// Server IP or hostname
        ip: String,
        /// Command lines, e.g. '{"type":"system_info"}'
        #[arg(required = true)]
        commands: Vec<String>,
        /// Server port
        #[arg(long, short, env = "DESKREMOTE_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Seconds to wait for each reply
        #[arg(long, default_value_t = 15)]
        timeout: u64,
    },
}
