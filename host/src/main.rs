use clap::Parser;
use host::{HostConfig, HostGame, HostSession};
use log::{error, info};
use shared::shutdown;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Combat frames per second
    #[arg(short = 'f', long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=1000))]
    frame_rate: u32,

    /// Peer snapshots sent to each player per second
    #[arg(short = 's', long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..=1000))]
    snapshot_rate: u32,

    /// Only receive positions, never send anything to players
    #[arg(long)]
    upload_only: bool,

    /// Listen on this port instead of a random one
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = HostConfig {
        frame_rate: args.frame_rate,
        ..HostConfig::default()
    };
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    config = config.with_snapshot_rate((!args.upload_only).then_some(args.snapshot_rate));

    info!("Starting host...");
    let host = HostSession::start(&config).await?;
    match host.endpoint() {
        Some(endpoint) => info!("Players can join at {}", endpoint),
        None => info!("Players can join on port {}", host.port()),
    }
    if args.upload_only {
        info!("Upload-only session, players will not see each other");
    }

    let (trigger, signal) = shutdown::channel();
    let game = HostGame::new(Arc::clone(host.session()));
    let mut game_handle = tokio::spawn(game.run(config.frame_interval(), signal));

    tokio::select! {
        result = &mut game_handle => {
            if let Err(e) = result {
                error!("Game loop task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    trigger.trigger();
    if !game_handle.is_finished() {
        if let Err(e) = game_handle.await {
            error!("Game loop task panicked: {}", e);
        }
    }
    host.shutdown().await?;

    Ok(())
}
