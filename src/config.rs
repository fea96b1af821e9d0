//! Application configuration
//!
//! Loaded from an optional JSON file. Missing fields take their defaults,
//! command-line flags are applied on top by the binary.

use crate::recorder::CaptureConfig;
use crate::utils::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default data endpoint: current Bitcoin block height
pub const DEFAULT_ENDPOINT: &str = "https://mempool.space/api/blocks/tip/height";

/// Data poller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollerConfig {
    /// HTTP GET endpoint returning a single value
    pub endpoint: String,

    /// Delay between fetches
    pub interval_ms: u64,

    /// Per-request timeout
    pub timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            interval_ms: 5000,
            timeout_ms: 10_000,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub poller: PollerConfig,
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if !self.poller.endpoint.starts_with("http://")
            && !self.poller.endpoint.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.poller.endpoint
            )));
        }
        if self.poller.interval_ms == 0 {
            return Err(AppError::Config("poll interval must be positive".to_string()));
        }
        if self.poller.timeout_ms == 0 {
            return Err(AppError::Config("request timeout must be positive".to_string()));
        }

        let capture = &self.capture;
        if capture.width == 0 || capture.height == 0 {
            return Err(AppError::Config(format!(
                "invalid resolution {}",
                capture.resolution()
            )));
        }
        // yuv420p needs even dimensions
        if capture.width % 2 != 0 || capture.height % 2 != 0 {
            return Err(AppError::Config(format!(
                "resolution {} must have even dimensions",
                capture.resolution()
            )));
        }
        if capture.fps == 0 || capture.refresh_hz == 0 {
            return Err(AppError::Config(
                "fps and refresh rate must be positive".to_string(),
            ));
        }
        if capture.file_stem.trim().is_empty() {
            return Err(AppError::Config("file name must not be empty".to_string()));
        }
        Ok(())
    }
}
