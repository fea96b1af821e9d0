//! Overlay Recorder - record a live camera feed with a polled value burned in.
//!
//! This is the main library crate. It provides the capture, overlay and
//! recording pipeline plus the `run` entry point used by the binary.

pub mod capture;
pub mod compositor;
pub mod config;
pub mod poller;
pub mod recorder;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use capture::{FrameSource, TestPatternSource};
use compositor::DisplayClock;
use config::AppConfig;
use poller::{DataPoller, HttpFetcher};
use recorder::{CaptureController, CaptureState, DirectorySink, FfmpegEncoderFactory};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::{AppError, AppResult};

/// How long to wait for the first camera frame
const SOURCE_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime options assembled by the binary
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: AppConfig,
    /// Use the synthetic source instead of a camera
    pub test_pattern: bool,
    /// Where downloaded artifacts are written
    pub output_dir: PathBuf,
    /// Record once for this long, then download and exit
    pub duration: Option<Duration>,
}

/// Run the application until the user quits
pub async fn run(options: RunOptions) -> AppResult<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "overlay_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Overlay Recorder v{}", env!("CARGO_PKG_VERSION"));
    options.config.validate()?;

    let RunOptions {
        config,
        test_pattern,
        output_dir,
        duration,
    } = options;

    let fetcher = HttpFetcher::new(&config.poller.endpoint, config.poller.timeout())?;
    let mut poller = DataPoller::new(Arc::new(fetcher), config.poller.interval());
    poller.start();

    let source = open_source(&config, test_pattern).await?;

    let mut controller = CaptureController::new(
        config.capture.clone(),
        source.clone(),
        poller.subscribe(),
        Arc::new(DisplayClock::new(config.capture.refresh_hz)),
        Arc::new(FfmpegEncoderFactory),
        Arc::new(DirectorySink::new(output_dir)),
    );
    spawn_event_logger(&controller);

    let outcome = match duration {
        Some(duration) => record_once(&mut controller, source.as_ref(), duration).await,
        None => command_loop(&mut controller).await,
    };

    // unmount
    controller.shutdown().await;
    poller.stop().await;

    outcome
}

async fn open_source(config: &AppConfig, test_pattern: bool) -> AppResult<Arc<dyn FrameSource>> {
    let settings = &config.capture;

    #[cfg(feature = "camera")]
    if !test_pattern {
        let device = settings.device_id.clone();
        let (requested, fps) = (settings.resolution(), settings.fps);
        let source = tokio::task::spawn_blocking(move || {
            capture::webcam::WebcamSource::open(device.as_deref(), requested, fps)
        })
        .await
        .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        return Ok(Arc::new(source));
    }

    #[cfg(not(feature = "camera"))]
    if !test_pattern {
        tracing::warn!("Built without camera support, using the test pattern");
    }

    Ok(Arc::new(TestPatternSource::spawn(
        settings.resolution(),
        settings.fps,
    )))
}

async fn wait_until_ready(source: &dyn FrameSource) -> AppResult<()> {
    let mut stream = source.stream();
    let ready = tokio::time::timeout(SOURCE_READY_TIMEOUT, async {
        while stream.latest().is_none() {
            if !stream.changed().await {
                return false;
            }
        }
        true
    })
    .await;

    match ready {
        Ok(true) => Ok(()),
        _ => Err(AppError::Capture(capture::CaptureError::Open {
            device: "frame source".to_string(),
            reason: "no frame received".to_string(),
        })),
    }
}

async fn record_once(
    controller: &mut CaptureController,
    source: &dyn FrameSource,
    duration: Duration,
) -> AppResult<()> {
    wait_until_ready(source).await?;
    controller.start_capture().await?;
    tracing::info!("Recording for {:?} (Ctrl+C stops early)", duration);

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    // whatever was assembled is saved even if the encoder failed to close
    let stopped = controller.stop_capture().await;
    match &stopped {
        Ok(summary) => tracing::info!(
            "Recorded {} chunks ({} bytes)",
            summary.session.chunk_count,
            summary.session.total_bytes
        ),
        Err(e) => tracing::error!("Capture did not stop cleanly: {}", e),
    }

    let downloaded = controller.download();
    stopped?;
    if !downloaded? {
        tracing::warn!("Nothing was recorded");
    }
    Ok(())
}

async fn command_loop(controller: &mut CaptureController) -> AppResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("Commands: capture, download, status, quit");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => continue,
            "capture" | "c" => match controller.toggle_capture().await {
                Ok(CaptureState::Idle) => tracing::info!(
                    "Capture stopped (download available: {})",
                    controller.controls().download_available
                ),
                Ok(state) => tracing::info!("Capture running ({:?})", state),
                Err(e) => tracing::warn!("Capture toggle rejected: {}", e),
            },
            "download" | "d" => match controller.download() {
                Ok(true) => {}
                Ok(false) => tracing::info!("Nothing to download"),
                Err(e) => tracing::error!("Download failed: {}", e),
            },
            "status" | "s" => {
                let controls = controller.controls();
                tracing::info!(
                    "State: {:?}, download available: {}",
                    controller.state(),
                    controls.download_available
                );
            }
            "quit" | "q" | "exit" => break,
            other => tracing::warn!("Unknown command '{}'", other),
        }
    }
    Ok(())
}

fn spawn_event_logger(controller: &CaptureController) {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!("Capture event: {:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Missed {} capture events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
