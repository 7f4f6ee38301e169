mod cli;
mod client;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use deskremote::capability::{Capabilities, SyntheticCapabilities, SystemCapabilities};
use deskremote::config::ServerConfig;
use deskremote::server::Server;
use deskremote::telemetry;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::initialise(&cli.logging.telemetry())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            upload_dir,
            synthetic,
        } => {
            let mut config = ServerConfig::default().with_address(host, port);
            if let Some(upload_dir) = upload_dir {
                config.upload_dir = upload_dir;
            }
            let capabilities: Arc<dyn Capabilities> = if synthetic {
                info!("using synthetic capabilities; no local input or capture");
                Arc::new(SyntheticCapabilities::new())
            } else {
                Arc::new(SystemCapabilities::new())
            };

            let server = Server::bind(config, capabilities)?;
            println!("Listening on {}", server.local_addr());

            let shutdown = server.shutdown_handle();
            tokio::spawn(async move {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    warn!(error = %error, "cannot listen for ctrl-c");
                    return;
                }
                info!("interrupt received");
                shutdown.shutdown();
            });
            server.run().await;
        }
        Commands::Send {
            ip,
            commands,
            port,
            timeout,
        } => {
            client::send_commands(&ip, port, &commands, Duration::from_secs(timeout)).await?;
        }
    }

    Ok(())
}
