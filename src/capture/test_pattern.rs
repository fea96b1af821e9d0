//! Synthetic frame source
//!
//! Produces a moving gradient so the pipeline can run without a camera.

use super::frame::VideoFrame;
use super::traits::{FramePublisher, FrameSource, FrameStream, Resolution};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Frame source that renders a test pattern at a fixed rate
pub struct TestPatternSource {
    publisher: Arc<FramePublisher>,
    cancel: CancellationToken,
}

impl TestPatternSource {
    /// Start producing frames. Must be called within a tokio runtime.
    pub fn spawn(resolution: Resolution, fps: u32) -> Self {
        let (publisher, _) = FrameStream::channel(resolution);
        let publisher = Arc::new(publisher);
        let cancel = CancellationToken::new();

        let period = Duration::from_secs(1) / fps.max(1);
        let task_publisher = publisher.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut index: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        task_publisher.publish(render_pattern(resolution, index));
                        index += 1;
                    }
                }
            }
            tracing::debug!("Test pattern stopped after {} frames", index);
        });

        tracing::info!("Test pattern source started: {} @ {}fps", resolution, fps);
        Self { publisher, cancel }
    }
}

impl FrameSource for TestPatternSource {
    fn resolution(&self) -> Resolution {
        self.publisher.resolution()
    }

    fn stream(&self) -> FrameStream {
        self.publisher.stream()
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Diagonal gradient scrolling one pixel per frame, with a vertical bar
/// sweeping across so motion is visible in recordings.
pub(crate) fn render_pattern(resolution: Resolution, index: u64) -> VideoFrame {
    let Resolution { width, height } = resolution;
    let mut data = Vec::with_capacity(resolution.rgba_len());
    let bar_x = if width > 0 { (index % width as u64) as u32 } else { 0 };

    for y in 0..height {
        for x in 0..width {
            if x.abs_diff(bar_x) < 4 {
                data.extend_from_slice(&[240, 240, 240, 255]);
                continue;
            }
            let shift = (x as u64 + y as u64 + index) % 256;
            let r = shift as u8;
            let g = ((y as u64 * 255) / height.max(1) as u64) as u8;
            let b = 255 - r;
            data.extend_from_slice(&[r, g, b, 255]);
        }
    }

    VideoFrame {
        width,
        height,
        sequence: index,
        data,
    }
}
