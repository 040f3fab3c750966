//! blobdisk - pooled page-blob disks for Azure virtual machines

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blobdisk::cli::{Cli, Commands};
use blobdisk::config::{load_settings_from, Settings};
use blobdisk::Result;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.debug);

    // Execute the command
    if let Err(e) = run(cli).await {
        error!("Error: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting blobdisk");

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::get_config_path()?,
    };
    let settings = load_settings_from(Some(path.as_path()))?;

    // Config commands work on incomplete settings
    if !matches!(cli.command, Commands::Config { .. }) {
        settings.validate()?;
    }

    cli.execute(settings).await
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("blobdisk=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "blobdisk=info".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
