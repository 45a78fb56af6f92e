use clap::Parser;
use client::{ClientConfig, ClientGame, ClientLink, ClientView, LinkExit};
use log::{error, info};
use shared::shutdown;
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host IPv4 address, as shown by the host
    #[arg(short = 'H', long)]
    host: Ipv4Addr,

    /// Host port, as shown by the host
    #[arg(short, long)]
    port: u16,

    /// Frames per second for the local boat
    #[arg(short = 'f', long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=1000))]
    frame_rate: u32,

    /// Longest wait for the host before sending our position anyway
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ClientConfig::new(args.host, args.port);
    config.frame_rate = args.frame_rate;
    config.link.poll_interval = Duration::from_millis(args.poll_interval_ms);

    info!("Starting client...");
    info!("Joining session at {}", config.host);

    let view = ClientView::new(config.spawn);
    let link = ClientLink::connect(config.host, view.clone(), config.link.clone()).await?;

    let (trigger, signal) = shutdown::channel();
    let game_handle = tokio::spawn(ClientGame::new(view).run(config.frame_interval(), trigger.subscribe()));
    let mut link_handle = tokio::spawn(link.run(signal));

    let mut link_done = false;
    tokio::select! {
        result = &mut link_handle => {
            link_done = true;
            match result {
                Ok(Ok(LinkExit::HostClosed)) => info!("Session ended by host"),
                Ok(Ok(LinkExit::Cancelled)) => {}
                Ok(Err(e)) => error!("Lost connection to host: {}", e),
                Err(e) => error!("Link task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    trigger.trigger();
    if !link_done {
        if let Err(e) = link_handle.await {
            error!("Link task panicked: {}", e);
        }
    }
    if let Err(e) = game_handle.await {
        error!("Game loop task panicked: {}", e);
    }

    Ok(())
}
