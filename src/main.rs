use anyhow::{Context, Result};
use clap::Parser;
use omnihost_core::{logging, HostConfig};
use omnihost_lifecycle::ExtensionHost;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// OmniHost - runtime host for loadable service extensions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/omnihost.yaml")]
    config: PathBuf,

    /// Override the extension root
    #[arg(short, long, env = "OMNIHOST_EXTENSIONS")]
    extensions: Option<PathBuf>,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,

    /// Rescan the extension root periodically
    #[arg(long)]
    hot_reload: bool,

    /// Print extension status as JSON once started
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = HostConfig::from_config_builder(&args.config)
        .with_context(|| format!("Failed to load config: {:?}", args.config))?;
    if let Some(root) = args.extensions {
        config.extensions.root = root;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.hot_reload {
        config.lifecycle.hot_reload = true;
    }
    config.validate().context("Invalid configuration")?;

    logging::init(&config.logging).context("Failed to initialize logging")?;

    info!(
        config = %args.config.display(),
        root = %config.extensions.root.display(),
        hot_reload = config.lifecycle.hot_reload,
        "Starting OmniHost"
    );

    let host = ExtensionHost::new(config);
    let result = host.start().await;
    for (id, reason) in &result.failure_reason {
        error!(extension_id = %id, reason = %reason, "Extension failed to load");
    }

    if args.status {
        let status = host.operations().status();
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal, draining extensions...");

    let report = host.shutdown().await;
    if !report.is_clean() {
        warn!(
            failed = ?report.failed,
            unfinished = ?report.unfinished,
            "Shutdown finished with problems"
        );
    }

    info!(drained = report.completed.len(), "OmniHost stopped");
    Ok(())
}
