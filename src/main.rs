use anyhow::{Context, Result};
use clap::Parser;
use overlay_recorder::config::AppConfig;
use overlay_recorder::recorder::Container;
use overlay_recorder::{run, RunOptions};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "overlay-recorder",
    version,
    about = "Record a camera feed with a live data badge burned in"
)]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint polled for the overlay value
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Camera device index or name
    #[arg(short, long)]
    device: Option<String>,

    /// Use a synthetic test pattern instead of a camera
    #[arg(long)]
    test_pattern: bool,

    /// Record the raw camera stream, overlay only in the preview
    #[arg(long)]
    raw: bool,

    /// Output container
    #[arg(long)]
    container: Option<Container>,

    /// Directory downloads are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Record once for this many seconds, download, and exit
    #[arg(long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    if let Some(endpoint) = cli.endpoint {
        config.poller.endpoint = endpoint;
    }
    if let Some(device) = cli.device {
        config.capture.device_id = Some(device);
    }
    if cli.raw {
        config.capture.burn_overlay_into_recording = false;
    }
    if let Some(container) = cli.container {
        config.capture.container = container;
    }

    let options = RunOptions {
        config,
        test_pattern: cli.test_pattern,
        output_dir: cli.output_dir,
        duration: cli.duration.filter(|&secs| secs > 0).map(Duration::from_secs),
    };

    if let Err(e) = run(options).await {
        tracing::error!(code = e.code(), "{}", e);
        return Err(e.into());
    }

    Ok(())
}
