//! Capture trait definitions
//!
//! Platform-agnostic types shared by every frame source.

use super::frame::VideoFrame;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No camera found")]
    NoDevice,

    #[error("Failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("Invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of one RGBA frame in bytes
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,
}

/// Read handle on a live frame sequence.
///
/// Cloning is cheap; every clone sees the same latest frame.
#[derive(Clone)]
pub struct FrameStream {
    resolution: Resolution,
    rx: watch::Receiver<Option<Arc<VideoFrame>>>,
}

impl FrameStream {
    /// Create a publisher and its stream
    pub fn channel(resolution: Resolution) -> (FramePublisher, FrameStream) {
        let (tx, rx) = watch::channel(None);
        let publisher = FramePublisher {
            resolution,
            tx,
            sequence: AtomicU64::new(0),
        };
        (publisher, FrameStream { resolution, rx })
    }

    /// Logical resolution of the stream
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Most recent frame, if any has been produced yet
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.rx.borrow().clone()
    }

    /// Wait until a new frame is published. Returns `false` once the
    /// publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Single writer side of a [`FrameStream`]
pub struct FramePublisher {
    resolution: Resolution,
    tx: watch::Sender<Option<Arc<VideoFrame>>>,
    sequence: AtomicU64,
}

impl FramePublisher {
    /// Publish raw RGBA pixels as the next frame
    pub fn publish_rgba(&self, width: u32, height: u32, data: Vec<u8>) -> Result<(), CaptureError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = VideoFrame::new(width, height, sequence, data)?;
        self.publish(frame);
        Ok(())
    }

    /// Publish an already built frame
    pub fn publish(&self, frame: VideoFrame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }

    /// Withdraw the current frame so readers see no frame until the next publish
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// New read handle
    pub fn stream(&self) -> FrameStream {
        FrameStream {
            resolution: self.resolution,
            rx: self.tx.subscribe(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// A live video source
pub trait FrameSource: Send + Sync {
    /// Logical resolution of produced frames
    fn resolution(&self) -> Resolution;

    /// Handle on the live frames
    fn stream(&self) -> FrameStream;

    /// Whether at least one frame has been produced
    fn is_ready(&self) -> bool {
        self.stream().latest().is_some()
    }
}

impl FrameSource for FramePublisher {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn stream(&self) -> FrameStream {
        FramePublisher::stream(self)
    }
}
