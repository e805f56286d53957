use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pinhole::{Client, ClientConfig, Server, ServerConfig, Shutdown};

/// Default rendezvous relay, overridable per invocation.
const DEFAULT_RELAY: &str = "delthas.fr:14761";

#[derive(Parser, Debug)]
#[command(name = "pinhole")]
#[command(author, version, about = "UDP NAT traversal proxy for peer-to-peer games", long_about = None)]
struct Args {
    /// Rendezvous relay, host or host:port.
    #[arg(long, global = true, default_value = DEFAULT_RELAY)]
    relay: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a remote host; point the game at the printed loopback port.
    Client {
        /// Remote host: IPv4 or hostname.
        host: String,
        /// Remote application port.
        port: u16,
    },
    /// Host a local application port for remote clients.
    Server {
        /// Local application port to expose.
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (shutdown, signal_rx) = Shutdown::new();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.trigger();
        }
    });

    match args.command {
        Command::Client { host, port } => {
            let client = Client::bind(&ClientConfig {
                relay: args.relay,
                remote_host: host,
                remote_port: port,
            })
            .await?;
            client.run(signal_rx).await
        }
        Command::Server { port } => {
            let server = Server::bind(&ServerConfig { relay: args.relay, app_port: port }).await?;
            server.run(signal_rx).await
        }
    }
}
