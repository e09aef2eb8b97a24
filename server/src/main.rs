use clap::Parser;
use log::{error, info};
use server::config::{AdminCredentials, ServerConfig};
use server::network::{Server, ServerMessage};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Simulation tick period in milliseconds
    #[arg(short, long, default_value_t = shared::TICK_MS)]
    tick_ms: u64,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "256")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    client_timeout_secs: u64,

    /// Directory for settings.json and stats.json
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Operator user name; admin login is disabled unless both are set
    #[arg(long)]
    admin_user: Option<String>,

    /// Operator password
    #[arg(long)]
    admin_pass: Option<String>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        let admin = match (args.admin_user, args.admin_pass) {
            (Some(user), Some(pass)) => Some(AdminCredentials { user, pass }),
            _ => None,
        };

        ServerConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_duration: Duration::from_millis(args.tick_ms.max(1)),
            max_clients: args.max_clients,
            client_timeout: Duration::from_secs(args.client_timeout_secs),
            data_dir: args.data_dir,
            admin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!("Starting server on {}", config.bind_addr);
    info!("Persisting to {}", config.data_dir.display());

    let mut server = Server::new(config).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            if shutdown.send(ServerMessage::Shutdown).is_err() {
                error!("Server loop already stopped");
            }
        }
    });

    server.run().await?;

    Ok(())
}
