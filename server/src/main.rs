use clap::Parser;
use log::info;
use server::{ServerConfig, ServerSession};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Number of players; the game starts when all have joined
    #[arg(short = 'n', long, default_value = "2")]
    players: usize,

    /// Map width in tiles
    #[arg(long, default_value = "24")]
    width: i32,

    /// Map height in tiles
    #[arg(long, default_value = "16")]
    height: i32,

    /// Disable fog of war
    #[arg(long)]
    no_fog: bool,

    /// Seed for map generation and battle draws
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        players: args.players,
        map_width: args.width,
        map_height: args.height,
        fog: !args.no_fog,
        seed: args.seed,
    };

    info!("Starting server for {} players...", config.players);
    info!("Map: {}x{}, fog {}", config.map_width, config.map_height, if config.fog { "on" } else { "off" });

    let session = ServerSession::bind(config).await?;
    info!("Waiting for players on {}", session.local_addr());

    tokio::select! {
        result = session.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
    }

    Ok(())
}
