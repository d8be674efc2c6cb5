use clap::Parser;
use log::{error, info, warn};
use server::config::ServerConfig;
use server::network::MasterServer;
use shared::{DEFAULT_PAGE_SIZE, DEFAULT_PORT, MAX_DATAGRAM_SIZE};
use std::net::Ipv4Addr;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IPv4 address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: Ipv4Addr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Servers returned per query (1-677)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Only answer queries for this game id (0 answers all)
    #[arg(short, long, default_value_t = 0)]
    game_id: u32,

    /// Ignore register and shutdown requests
    #[arg(long)]
    no_registration: bool,

    /// Override whether shutdown requests are honoured
    #[arg(long)]
    deregistration: Option<bool>,

    /// Server to list at startup, as ip:port (repeatable)
    #[arg(short, long = "server", value_name = "ENDPOINT")]
    servers: Vec<String>,

    /// Largest datagram read from the socket
    #[arg(long, default_value_t = MAX_DATAGRAM_SIZE)]
    read_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ServerConfig::new(!args.no_registration, args.page_size, args.game_id)?;
    if let Some(allow) = args.deregistration {
        config = config.with_deregistration(allow);
    }
    info!("Starting master server with {:?}", config);

    let mut server = MasterServer::new(config).with_read_size(args.read_size);

    let preloaded = server.engine_mut().registry_mut().add_all(&args.servers);
    if preloaded < args.servers.len() {
        warn!(
            "{} of {} startup servers were duplicates or malformed",
            args.servers.len() - preloaded,
            args.servers.len()
        );
    }

    server.create(args.host, args.port)?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Master server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    server.close();
    Ok(())
}
