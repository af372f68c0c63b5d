use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;

use dispatch_core::print_logo;

use dispatchd::{config_source::FileConfigSource, runner::Runner};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path of the config file (.json or .toml)
    #[clap(short, long, value_parser)]
    config: PathBuf,

    /// Re-read and resubmit the config file on this interval, in seconds. 0 disables
    /// polling (spec §4.8).
    #[clap(long, default_value_t = 0)]
    poll_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    print_logo();

    let args = Args::parse();

    let initial = match dispatch_core::config::load(&args.config).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "failed to load initial configuration");
            std::process::exit(1);
        }
    };

    let runner = Runner::new();
    if let Err(e) = runner.submit(initial).await {
        tracing::error!(error = %e, "initial configuration failed to apply");
        std::process::exit(1);
    }

    let poll_interval = Duration::from_secs(args.poll_interval_secs);
    let source = FileConfigSource::new(args.config.clone());

    tokio::select! {
        _ = runner.poll(source, poll_interval), if !poll_interval.is_zero() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, draining listeners");
        }
    }

    runner.shutdown().await;
    Ok(())
}
