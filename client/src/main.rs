use clap::{Parser, Subcommand};
use client::network::MasterClient;
use log::info;
use shared::{Endpoint, QueryRequest, FILTER_ALL_REGIONS};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master server address
    #[arg(short, long, default_value = "127.0.0.1:27010")]
    master: String,

    /// Local address to send from; register from the address players join on
    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: String,

    /// How long to wait for each reply, in milliseconds
    #[arg(short, long, default_value = "3000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add the bound address to the master's list
    Register,
    /// Remove the bound address from the master's list
    Deregister,
    /// Print every listed server
    List {
        /// Game id to ask for
        #[arg(short, long, default_value_t = 0)]
        game_id: u32,

        /// Region filter byte
        #[arg(short, long, default_value_t = FILTER_ALL_REGIONS)]
        filter: u8,

        /// Stop after this many servers
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let client = MasterClient::bind(
        &args.bind,
        &args.master,
        Duration::from_millis(args.timeout_ms),
    )
    .await?;

    match args.command {
        Command::Register => client.register().await?,
        Command::Deregister => client.deregister().await?,
        Command::List {
            game_id,
            filter,
            limit,
        } => {
            let request = QueryRequest::new(Endpoint::UNSPECIFIED, game_id).with_filter(filter);
            let servers = client.query_all(&request, limit).await?;

            info!("{} servers listed by {}", servers.len(), client.master_addr());
            for server in servers {
                println!("{}", server);
            }
        }
    }

    Ok(())
}
