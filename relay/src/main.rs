use clap::Parser;
use log::info;
use relay::network::Relay;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// UDP port to listen on
    #[arg(short, long, default_value = "7777")]
    port: u16,

    /// Maximum number of registered peers
    #[arg(short, long, default_value = "4")]
    max_peers: usize,

    /// Seconds of silence before a peer is dropped
    #[arg(short, long, default_value = "5")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    info!(
        "Starting relay on {} for up to {} peers ({}s timeout)",
        address, args.max_peers, args.timeout
    );

    let mut relay = Relay::new(&address, args.max_peers, Duration::from_secs(args.timeout)).await?;
    relay.run().await?;

    Ok(())
}
