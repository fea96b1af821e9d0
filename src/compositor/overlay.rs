//! Overlay compositor draw loop

use super::badge::BadgeLayout;
use super::clock::{TickScheduler, TickSource};
use super::surface::CompositeSurface;
use crate::capture::{FramePublisher, FrameStream, Resolution, VideoFrame};
use crate::poller::PolledValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Draw loop counters
#[derive(Debug, Default)]
pub struct CompositorStats {
    ticks: AtomicU64,
    frames_drawn: AtomicU64,
    frames_skipped: AtomicU64,
}

impl CompositorStats {
    /// Ticks handled since creation
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks that painted a camera frame
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.load(Ordering::Relaxed)
    }

    /// Ticks where the source had no frame yet
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }
}

/// Paint one composite frame: video first, then the badge with `text`.
///
/// With no frame the previous contents stay and only the badge is redrawn.
pub fn compose(
    surface: &mut CompositeSurface,
    frame: Option<&VideoFrame>,
    text: &str,
    layout: &BadgeLayout,
) {
    if let Some(frame) = frame {
        surface.draw_frame(frame);
    }
    layout.draw(surface, text);
}

struct DrawTask {
    cancel: CancellationToken,
    handle: JoinHandle<CompositeSurface>,
}

/// Redraws the camera frame plus the latest polled value on every display
/// tick while active.
pub struct OverlayCompositor {
    resolution: Resolution,
    source: FrameStream,
    values: watch::Receiver<PolledValue>,
    scheduler: Arc<dyn TickScheduler>,
    layout: BadgeLayout,
    /// `None` while a draw task owns the surface
    surface: Option<CompositeSurface>,
    output: Arc<FramePublisher>,
    stats: Arc<CompositorStats>,
    task: Option<DrawTask>,
}

impl OverlayCompositor {
    /// Allocate the surface. Nothing is drawn until [`start`](Self::start).
    pub fn new(
        resolution: Resolution,
        source: FrameStream,
        values: watch::Receiver<PolledValue>,
        scheduler: Arc<dyn TickScheduler>,
    ) -> Self {
        let (output, _) = FrameStream::channel(resolution);
        Self {
            resolution,
            source,
            values,
            scheduler,
            layout: BadgeLayout::default(),
            surface: Some(CompositeSurface::new(resolution)),
            output: Arc::new(output),
            stats: Arc::new(CompositorStats::default()),
            task: None,
        }
    }

    pub fn with_layout(mut self, layout: BadgeLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// The composite stream, capturable like a camera
    pub fn stream(&self) -> FrameStream {
        self.output.stream()
    }

    pub fn stats(&self) -> &CompositorStats {
        &self.stats
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Last painted surface contents, or `None` while the loop is running
    pub fn surface(&self) -> Option<&CompositeSurface> {
        self.surface.as_ref()
    }

    /// Register for display ticks and start drawing. Returns `false` if
    /// already active.
    pub fn start(&mut self) -> bool {
        if self.task.is_some() {
            return false;
        }

        // a new run starts without the previous run's last composite
        self.output.clear();

        let surface = self
            .surface
            .take()
            .unwrap_or_else(|| CompositeSurface::new(self.resolution));
        let ticks = self.scheduler.subscribe();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_draw_loop(
            surface,
            ticks,
            DrawContext {
                source: self.source.clone(),
                values: self.values.clone(),
                layout: self.layout.clone(),
                output: self.output.clone(),
                stats: self.stats.clone(),
            },
            cancel.clone(),
        ));

        tracing::info!("Compositing started at {}", self.resolution);
        self.task = Some(DrawTask { cancel, handle });
        true
    }

    /// Cancel the tick registration and wait for the draw loop to exit.
    ///
    /// When this returns no further tick will be drawn. Returns `false` if
    /// the compositor was not active.
    pub async fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        task.cancel.cancel();
        let surface = match task.handle.await {
            Ok(surface) => surface,
            Err(e) => {
                tracing::error!("Draw loop failed: {}", e);
                CompositeSurface::new(self.resolution)
            }
        };
        self.surface = Some(surface);

        tracing::info!(
            "Compositing stopped ({} ticks, {} frames drawn, {} skipped)",
            self.stats.ticks(),
            self.stats.frames_drawn(),
            self.stats.frames_skipped()
        );
        true
    }
}

impl Drop for OverlayCompositor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
        }
    }
}

struct DrawContext {
    source: FrameStream,
    values: watch::Receiver<PolledValue>,
    layout: BadgeLayout,
    output: Arc<FramePublisher>,
    stats: Arc<CompositorStats>,
}

async fn run_draw_loop(
    mut surface: CompositeSurface,
    mut ticks: Box<dyn TickSource>,
    ctx: DrawContext,
    cancel: CancellationToken,
) -> CompositeSurface {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            tick = ticks.next_tick() => {
                if tick.is_none() {
                    tracing::warn!("Tick scheduler closed, draw loop exiting");
                    break;
                }
                draw_tick(&mut surface, &ctx);
            }
        }
    }
    // dropping `ticks` here ends the registration
    surface
}

fn draw_tick(surface: &mut CompositeSurface, ctx: &DrawContext) {
    let sequence = ctx.stats.ticks.fetch_add(1, Ordering::Relaxed);
    let frame = ctx.source.latest();
    let text = ctx.values.borrow().display_text();

    match &frame {
        Some(_) => ctx.stats.frames_drawn.fetch_add(1, Ordering::Relaxed),
        None => ctx.stats.frames_skipped.fetch_add(1, Ordering::Relaxed),
    };

    compose(surface, frame.as_deref(), &text, &ctx.layout);
    ctx.output.publish(surface.snapshot(sequence));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::ManualClock;
    use crate::poller::ScalarValue;

    const RES: Resolution = Resolution::new(160, 120);

    fn solid_frame(color: [u8; 4]) -> VideoFrame {
        let data = color.iter().copied().cycle().take(RES.rgba_len()).collect();
        VideoFrame::new(RES.width, RES.height, 0, data).unwrap()
    }

    fn fixture() -> (
        OverlayCompositor,
        FramePublisher,
        watch::Sender<PolledValue>,
        ManualClock,
    ) {
        let (camera, camera_stream) = FrameStream::channel(RES);
        let (value_tx, value_rx) = watch::channel(PolledValue::default());
        let clock = ManualClock::new();
        let compositor =
            OverlayCompositor::new(RES, camera_stream, value_rx, Arc::new(clock.clone()));
        (compositor, camera, value_tx, clock)
    }

    #[test]
    fn test_compose_is_deterministic() {
        let frame = solid_frame([10, 20, 30, 255]);
        let layout = BadgeLayout::default();

        let mut first = CompositeSurface::new(RES);
        let mut second = CompositeSurface::new(RES);
        compose(&mut first, Some(&frame), "101", &layout);
        compose(&mut second, Some(&frame), "101", &layout);
        compose(&mut second, Some(&frame), "101", &layout);

        assert_eq!(first.data(), second.data());
        assert_eq!(first.pixel(5, 100), Some([10, 20, 30, 255]));
    }

    #[tokio::test]
    async fn test_tick_draws_latest_frame_and_value() {
        let (mut compositor, camera, value_tx, clock) = fixture();
        let mut output = compositor.stream();

        camera.publish(solid_frame([0, 128, 0, 255]));
        value_tx.send_modify(|v| *v = v.advanced(ScalarValue::from(100)));

        assert!(compositor.start());
        assert_eq!(clock.tick(), 1);
        assert!(output.changed().await);

        let painted = output.latest().unwrap();
        assert_eq!(painted.pixel(5, 100), Some([0, 128, 0, 255]));

        let mut expected = CompositeSurface::new(RES);
        compose(
            &mut expected,
            Some(&solid_frame([0, 128, 0, 255])),
            "100",
            &BadgeLayout::default(),
        );
        assert_eq!(painted.data, expected.data());

        // the next tick picks up the new value without restarting the loop
        value_tx.send_modify(|v| *v = v.advanced(ScalarValue::from(101)));
        clock.tick();
        assert!(output.changed().await);
        let mut expected = CompositeSurface::new(RES);
        compose(
            &mut expected,
            Some(&solid_frame([0, 128, 0, 255])),
            "101",
            &BadgeLayout::default(),
        );
        assert_eq!(output.latest().unwrap().data, expected.data());

        assert!(compositor.stop().await);
        assert_eq!(compositor.stats().frames_drawn(), 2);
    }

    #[tokio::test]
    async fn test_missing_frame_skips_draw_but_keeps_ticking() {
        let (mut compositor, camera, _value_tx, clock) = fixture();
        let mut output = compositor.stream();

        compositor.start();
        clock.tick();
        assert!(output.changed().await);
        assert_eq!(compositor.stats().frames_skipped(), 1);

        camera.publish(solid_frame([1, 2, 3, 255]));
        clock.tick();
        assert!(output.changed().await);
        assert_eq!(compositor.stats().frames_drawn(), 1);
        assert_eq!(output.latest().unwrap().pixel(0, 119), Some([1, 2, 3, 255]));

        compositor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_registration() {
        let (mut compositor, _camera, _value_tx, clock) = fixture();

        compositor.start();
        assert!(!compositor.start());
        assert_eq!(clock.registrations(), 1);

        assert!(compositor.stop().await);
        assert!(!compositor.is_active());
        assert_eq!(clock.registrations(), 0);

        // ticks after stop reach nobody
        assert_eq!(clock.tick(), 0);
        assert_eq!(compositor.stats().ticks(), 0);
    }

    #[tokio::test]
    async fn test_restart_does_not_replay_previous_composite() {
        let (mut compositor, camera, _value_tx, clock) = fixture();
        camera.publish(solid_frame([9, 9, 9, 255]));

        compositor.start();
        let mut output = compositor.stream();
        clock.tick();
        assert!(output.changed().await);
        assert!(output.latest().is_some());
        compositor.stop().await;

        compositor.start();
        let mut output = compositor.stream();
        assert!(output.latest().is_none());

        clock.tick();
        assert!(output.changed().await);
        assert_eq!(output.latest().unwrap().sequence, 1);
        compositor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_with_no_frames_leaves_blank_surface() {
        let (mut compositor, _camera, _value_tx, _clock) = fixture();

        compositor.start();
        assert!(compositor.surface().is_none());
        assert!(compositor.stop().await);

        let surface = compositor.surface().unwrap();
        assert!(surface.data().iter().all(|&b| b == 0));
        assert!(!compositor.stop().await);
    }
}
