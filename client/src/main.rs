use clap::Parser;
use client::config::{Difficulty, SessionConfig, TowerUpgradeTable, WaveStatTable};
use client::error::ConfigError;
use client::network::Peer;
use client::session::Session;
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address every message goes through
    #[arg(short = 'r', long, default_value = "127.0.0.1:7777")]
    relay: String,

    /// Local address to bind the UDP socket to
    #[arg(short = 'b', long, default_value = "0.0.0.0:0")]
    bind: String,

    /// This player's index; 0 is the host
    #[arg(short = 'i', long, default_value = "0")]
    player_index: i32,

    /// Number of players in the session
    #[arg(short = 'n', long, default_value = "1")]
    players: usize,

    #[arg(short = 'd', long, value_enum, default_value_t = Difficulty::Normal)]
    difficulty: Difficulty,

    /// Simulation ticks per second
    #[arg(short = 't', long, default_value = "30")]
    tick_rate: u32,

    /// Seed for stun and true damage rolls
    #[arg(short = 's', long, default_value = "0")]
    seed: u64,

    /// JSON file with per-wave enemy stats
    #[arg(long)]
    wave_stats: Option<PathBuf>,

    /// JSON file with tower upgrade levels
    #[arg(long)]
    tower_upgrades: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    if args.tick_rate == 0 {
        return Err(ConfigError::TickRate.into());
    }

    let config = SessionConfig {
        local_player: args.player_index,
        player_count: args.players,
        difficulty: args.difficulty,
        seed: args.seed,
        wave_stats: WaveStatTable::load_or_default(args.wave_stats.as_deref())?,
        tower_upgrades: TowerUpgradeTable::load_or_default(args.tower_upgrades.as_deref())?,
        ..SessionConfig::default()
    };
    config.validate()?;

    info!("Starting client...");
    info!("Relay: {}", args.relay);
    info!("Commands: build, move, point <x> <z>, confirm, cancel, select ..., tower <kind>, lab <kind>, speed, start, status, quit");

    let session = Session::new(config);
    let mut peer = Peer::new(&args.bind, &args.relay, session, args.tick_rate)
        .await?
        .with_stdin();

    peer.run().await?;

    Ok(())
}
