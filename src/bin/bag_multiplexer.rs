use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rosbag_mux::bag_mux::cli_common::MuxArgs;
use rosbag_mux::bag_mux::multiplex_bags;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Merge several bags into one, shifting each so they all start at the same time.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    mux: MuxArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rosbag_mux=info,bag_multiplexer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let options = args.mux.into_options();

    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Received interrupt, stopping after the current message");
        c.store(true, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler")?;

    let report = multiplex_bags(&options, &cancel)?;
    for (topic, count) in report.topic_counts() {
        info!("{:>8} {}", count, topic);
    }
    if let Some(metadata) = &report.metadata {
        info!("Metadata saved to {}", metadata);
    }
    Ok(())
}
