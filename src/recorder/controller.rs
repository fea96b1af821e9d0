//! Capture controller
//!
//! Drives the compositor and the recording session together and owns the
//! last assembled artifact until it is downloaded.

use super::artifact::{Artifact, ArtifactAssembler, DownloadSink};
use super::encoder::EncoderFactory;
use super::error::{RecordingError, RecordingResult};
use super::session::{RecordingSession, SessionSummary};
use super::state::{CaptureConfig, CaptureState, RecordingState};
use crate::capture::{FrameSource, FrameStream};
use crate::compositor::{OverlayCompositor, TickScheduler};
use crate::poller::PolledValue;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    CompositingStarted,
    CompositingStopped,
    RecordingStarted(Uuid),
    RecordingStopped { chunk_count: usize, total_bytes: usize },
    /// An artifact is available for download
    ArtifactReady { file_name: String, size: usize },
    ArtifactDelivered { file_name: String },
}

/// What the user can currently do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSurface {
    /// The capture toggle currently means "stop"
    pub capturing: bool,
    /// Whether the download control is offered
    pub download_available: bool,
}

/// Result of a stopped capture
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
    pub session: SessionSummary,
    /// Size of the assembled artifact, `None` if nothing was recorded
    pub artifact_bytes: Option<usize>,
}

/// Orchestrates compositing, recording and download
pub struct CaptureController {
    config: CaptureConfig,
    source: Arc<dyn FrameSource>,
    compositor: OverlayCompositor,
    session: RecordingSession,
    assembler: ArtifactAssembler,
    encoders: Arc<dyn EncoderFactory>,
    sink: Arc<dyn DownloadSink>,
    artifact: Option<Artifact>,
    event_tx: broadcast::Sender<CaptureEvent>,
}

impl CaptureController {
    /// Wire up the pipeline. The composite surface is allocated here.
    pub fn new(
        config: CaptureConfig,
        source: Arc<dyn FrameSource>,
        values: watch::Receiver<PolledValue>,
        scheduler: Arc<dyn TickScheduler>,
        encoders: Arc<dyn EncoderFactory>,
        sink: Arc<dyn DownloadSink>,
    ) -> Self {
        let compositor =
            OverlayCompositor::new(config.resolution(), source.stream(), values, scheduler);
        let assembler = ArtifactAssembler::new(config.file_name(), config.container.mime_type());
        let (event_tx, _) = broadcast::channel(100);

        Self {
            config,
            source,
            compositor,
            session: RecordingSession::new(),
            assembler,
            encoders,
            sink,
            artifact: None,
            event_tx,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        if self.session.state() == RecordingState::Active {
            CaptureState::Recording
        } else if self.compositor.is_active() {
            CaptureState::Compositing
        } else {
            CaptureState::Idle
        }
    }

    pub fn controls(&self) -> ControlSurface {
        ControlSurface {
            capturing: self.state() != CaptureState::Idle,
            download_available: self.artifact.is_some(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.event_tx.subscribe()
    }

    /// Composite stream for on-screen preview
    pub fn preview(&self) -> FrameStream {
        self.compositor.stream()
    }

    pub fn compositor(&self) -> &OverlayCompositor {
        &self.compositor
    }

    /// Artifact waiting for download, if any
    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    fn emit(&self, event: CaptureEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Start compositing (when configured) and recording as one action
    pub async fn start_capture(&mut self) -> RecordingResult<()> {
        if self.state() != CaptureState::Idle {
            return Err(RecordingError::AlreadyCapturing);
        }
        if !self.source.is_ready() {
            tracing::warn!("Frame source has no frame yet, not starting capture");
            return Err(RecordingError::SourceNotReady);
        }

        let burn = self.config.burn_overlay_into_recording;
        if (burn || self.config.preview_overlay) && self.compositor.start() {
            self.emit(CaptureEvent::CompositingStarted);
        }

        let stream = if burn {
            self.compositor.stream()
        } else {
            self.source.stream()
        };
        let encoder = self.encoders.create(&self.config.encoder_settings());

        if let Err(e) = self.session.start(stream, encoder).await {
            if self.compositor.stop().await {
                self.emit(CaptureEvent::CompositingStopped);
            }
            return Err(e);
        }

        if let Some(stale) = self.artifact.take() {
            tracing::info!(
                "Discarding {} ({} bytes), never downloaded",
                stale.file_name,
                stale.len()
            );
        }

        tracing::info!(
            "Capture started ({} stream)",
            if burn { "composite" } else { "raw" }
        );
        if let Some(id) = self.session.id() {
            self.emit(CaptureEvent::RecordingStarted(id));
        }
        Ok(())
    }

    /// Stop recording and compositing, then assemble the artifact.
    ///
    /// Whatever the encoder delivered is assembled even if it failed to
    /// close cleanly; that failure is returned afterwards.
    pub async fn stop_capture(&mut self) -> RecordingResult<CaptureSummary> {
        if self.session.state() == RecordingState::Idle {
            return Err(RecordingError::NotCapturing);
        }

        let stopped = self.session.stop().await;
        if self.compositor.stop().await {
            self.emit(CaptureEvent::CompositingStopped);
        }
        self.emit(CaptureEvent::RecordingStopped {
            chunk_count: self.session.chunk_count(),
            total_bytes: self.session.total_bytes(),
        });

        let artifact = self.assembler.assemble(&mut self.session)?;
        let artifact_bytes = artifact.as_ref().map(Artifact::len);
        if let Some(artifact) = &artifact {
            self.emit(CaptureEvent::ArtifactReady {
                file_name: artifact.file_name.clone(),
                size: artifact.len(),
            });
        }
        self.artifact = artifact;

        let session = stopped?;
        Ok(CaptureSummary {
            session,
            artifact_bytes,
        })
    }

    /// Start when idle, stop otherwise. Returns the resulting state.
    pub async fn toggle_capture(&mut self) -> RecordingResult<CaptureState> {
        if self.state() == CaptureState::Idle {
            self.start_capture().await?;
        } else {
            self.stop_capture().await?;
        }
        Ok(self.state())
    }

    /// Hand the artifact to the download sink.
    ///
    /// Returns `Ok(false)` when there is nothing to download. If the sink
    /// fails the artifact stays available.
    pub fn download(&mut self) -> RecordingResult<bool> {
        let Some(artifact) = self.artifact.take() else {
            tracing::debug!("Nothing to download");
            return Ok(false);
        };

        let file_name = artifact.file_name.clone();
        if let Err(e) = self.sink.deliver(artifact.clone()) {
            tracing::error!("Failed to deliver {}: {}", file_name, e);
            self.artifact = Some(artifact);
            return Err(e);
        }

        self.emit(CaptureEvent::ArtifactDelivered { file_name });
        Ok(true)
    }

    /// Stop everything that is running. Used at unmount.
    pub async fn shutdown(&mut self) {
        if self.session.state() == RecordingState::Active {
            if let Err(e) = self.stop_capture().await {
                tracing::warn!("Capture did not stop cleanly: {}", e);
            }
        }
        if self.compositor.stop().await {
            self.emit(CaptureEvent::CompositingStopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FramePublisher, Resolution, VideoFrame};
    use crate::compositor::ManualClock;
    use crate::testing::{MemorySink, ScriptedEncoderFactory};

    const RES: Resolution = Resolution::new(160, 120);

    struct Fixture {
        controller: CaptureController,
        camera: Arc<FramePublisher>,
        clock: ManualClock,
        encoders: Arc<ScriptedEncoderFactory>,
        sink: Arc<MemorySink>,
    }

    fn fixture(config: CaptureConfig, encoders: ScriptedEncoderFactory) -> Fixture {
        let (camera, _) = FrameStream::channel(RES);
        let camera = Arc::new(camera);
        let (_value_tx, values) = watch::channel(PolledValue::default());
        let clock = ManualClock::new();
        let encoders = Arc::new(encoders);
        let sink = Arc::new(MemorySink::new());

        let controller = CaptureController::new(
            CaptureConfig {
                width: RES.width,
                height: RES.height,
                ..config
            },
            camera.clone(),
            values,
            Arc::new(clock.clone()),
            encoders.clone(),
            sink.clone(),
        );

        Fixture {
            controller,
            camera,
            clock,
            encoders,
            sink,
        }
    }

    fn blue_frame() -> VideoFrame {
        let data = [0u8, 0, 255, 255]
            .iter()
            .copied()
            .cycle()
            .take(RES.rgba_len())
            .collect();
        VideoFrame::new(RES.width, RES.height, 0, data).unwrap()
    }

    fn ready(config: CaptureConfig, chunks: Vec<Vec<u8>>) -> Fixture {
        let f = fixture(config, ScriptedEncoderFactory::new(chunks));
        f.camera.publish(blue_frame());
        f
    }

    #[tokio::test]
    async fn test_record_and_download_drops_empty_chunks() {
        let mut f = ready(
            CaptureConfig::default(),
            vec![vec![], vec![1; 1024], vec![2; 2048]],
        );

        f.controller.start_capture().await.unwrap();
        assert_eq!(f.controller.state(), CaptureState::Recording);
        assert!(f.controller.controls().capturing);

        let summary = f.controller.stop_capture().await.unwrap();
        assert_eq!(f.controller.state(), CaptureState::Idle);
        assert_eq!(summary.session.chunk_count, 2);
        assert_eq!(summary.artifact_bytes, Some(3072));
        assert_eq!(
            f.controller.controls(),
            ControlSurface {
                capturing: false,
                download_available: true
            }
        );

        assert!(f.controller.download().unwrap());
        let delivered = f.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].len(), 3072);
        assert_eq!(delivered[0].file_name, "webcam-stream-capture.webm");
        assert_eq!(delivered[0].mime_type, "video/webm");
        assert!(delivered[0].data[..1024].iter().all(|&b| b == 1));

        assert!(!f.controller.controls().download_available);
        assert!(!f.controller.download().unwrap());
        assert_eq!(f.sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_download_without_chunks_is_noop() {
        let mut f = ready(CaptureConfig::default(), vec![vec![]]);

        assert!(!f.controller.download().unwrap());

        f.controller.start_capture().await.unwrap();
        let summary = f.controller.stop_capture().await.unwrap();
        assert_eq!(summary.artifact_bytes, None);
        assert!(!f.controller.controls().download_available);
        assert!(!f.controller.download().unwrap());
        assert!(f.sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_burned_overlay_records_composite_stream() {
        let mut f = ready(CaptureConfig::default(), vec![vec![1; 8]]);

        f.controller.start_capture().await.unwrap();
        assert_eq!(f.clock.registrations(), 1);

        let mut recorded = f.encoders.streams().remove(0);
        assert!(recorded.latest().is_none());
        f.clock.tick();
        assert!(recorded.changed().await);
        let frame = recorded.latest().unwrap();
        assert_eq!(frame.pixel(5, 100), Some([0, 0, 255, 255]));
        assert_ne!(frame.data, blue_frame().data);

        f.controller.stop_capture().await.unwrap();
        assert_eq!(f.clock.registrations(), 0);
    }

    #[tokio::test]
    async fn test_raw_stream_with_and_without_preview() {
        let raw = CaptureConfig {
            burn_overlay_into_recording: false,
            preview_overlay: false,
            ..CaptureConfig::default()
        };
        let mut f = ready(raw.clone(), vec![vec![1; 8]]);

        f.controller.start_capture().await.unwrap();
        assert_eq!(f.controller.state(), CaptureState::Recording);
        assert_eq!(f.clock.registrations(), 0);
        let recorded = f.encoders.streams().remove(0);
        assert_eq!(recorded.latest().unwrap().data, blue_frame().data);
        f.controller.stop_capture().await.unwrap();

        let mut f = ready(
            CaptureConfig {
                preview_overlay: true,
                ..raw
            },
            vec![vec![1; 8]],
        );
        f.controller.start_capture().await.unwrap();
        assert_eq!(f.clock.registrations(), 1);
        let recorded = f.encoders.streams().remove(0);
        assert_eq!(recorded.latest().unwrap().data, blue_frame().data);
        f.controller.stop_capture().await.unwrap();
        assert_eq!(f.clock.registrations(), 0);
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_rejected() {
        let mut f = ready(CaptureConfig::default(), vec![vec![5; 5]]);

        assert!(matches!(
            f.controller.stop_capture().await,
            Err(RecordingError::NotCapturing)
        ));
        assert_eq!(f.controller.state(), CaptureState::Idle);

        f.controller.start_capture().await.unwrap();
        assert!(matches!(
            f.controller.start_capture().await,
            Err(RecordingError::AlreadyCapturing)
        ));
        assert_eq!(f.controller.state(), CaptureState::Recording);
        assert_eq!(f.encoders.created().len(), 1);

        let summary = f.controller.stop_capture().await.unwrap();
        assert_eq!(summary.artifact_bytes, Some(5));
    }

    #[tokio::test]
    async fn test_source_not_ready_leaves_idle() {
        let mut f = fixture(CaptureConfig::default(), ScriptedEncoderFactory::new(vec![]));

        assert!(matches!(
            f.controller.start_capture().await,
            Err(RecordingError::SourceNotReady)
        ));
        assert_eq!(f.controller.state(), CaptureState::Idle);
        assert_eq!(f.clock.registrations(), 0);
        assert!(f.encoders.created().is_empty());
    }

    #[tokio::test]
    async fn test_encoder_failure_rolls_back_compositor() {
        let mut f = fixture(CaptureConfig::default(), ScriptedEncoderFactory::failing());
        f.camera.publish(blue_frame());

        assert!(matches!(
            f.controller.start_capture().await,
            Err(RecordingError::EncoderUnavailable(_))
        ));
        assert_eq!(f.controller.state(), CaptureState::Idle);
        assert_eq!(f.clock.registrations(), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_artifact() {
        let mut f = ready(CaptureConfig::default(), vec![vec![4; 16]]);
        f.controller.start_capture().await.unwrap();
        f.controller.stop_capture().await.unwrap();

        f.sink.set_failing(true);
        assert!(f.controller.download().is_err());
        assert!(f.controller.controls().download_available);

        f.sink.set_failing(false);
        assert!(f.controller.download().unwrap());
        assert_eq!(f.sink.delivered()[0].len(), 16);
    }

    #[tokio::test]
    async fn test_new_capture_discards_pending_artifact() {
        let mut f = ready(CaptureConfig::default(), vec![vec![4; 16]]);
        f.controller.start_capture().await.unwrap();
        f.controller.stop_capture().await.unwrap();
        assert!(f.controller.artifact().is_some());

        assert_eq!(
            f.controller.toggle_capture().await.unwrap(),
            CaptureState::Recording
        );
        assert!(!f.controller.controls().download_available);
        assert_eq!(
            f.controller.toggle_capture().await.unwrap(),
            CaptureState::Idle
        );
        assert!(f.controller.controls().download_available);
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let mut f = ready(CaptureConfig::default(), vec![vec![7; 32]]);
        let mut events = f.controller.subscribe();

        f.controller.start_capture().await.unwrap();
        f.controller.stop_capture().await.unwrap();
        f.controller.download().unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }

        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], CaptureEvent::CompositingStarted);
        assert!(matches!(seen[1], CaptureEvent::RecordingStarted(_)));
        assert_eq!(seen[2], CaptureEvent::CompositingStopped);
        assert_eq!(
            seen[3],
            CaptureEvent::RecordingStopped {
                chunk_count: 1,
                total_bytes: 32
            }
        );
        assert_eq!(
            seen[4],
            CaptureEvent::ArtifactReady {
                file_name: "webcam-stream-capture.webm".to_string(),
                size: 32
            }
        );
        assert_eq!(
            seen[5],
            CaptureEvent::ArtifactDelivered {
                file_name: "webcam-stream-capture.webm".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_encoder_close_failure_still_yields_artifact() {
        let mut f = fixture(
            CaptureConfig::default(),
            ScriptedEncoderFactory::failing_on_stop(vec![vec![3; 100]; 3]),
        );
        f.camera.publish(blue_frame());

        f.controller.start_capture().await.unwrap();
        assert!(matches!(
            f.controller.stop_capture().await,
            Err(RecordingError::Encoder(_))
        ));
        assert_eq!(f.controller.state(), CaptureState::Idle);
        assert_eq!(f.controller.artifact().map(Artifact::len), Some(300));

        assert!(f.controller.download().unwrap());
        assert_eq!(f.sink.delivered()[0].chunk_count, 3);
    }

    #[tokio::test]
    async fn test_second_capture_starts_without_previous_composite() {
        let mut f = ready(CaptureConfig::default(), vec![vec![1; 8]]);

        f.controller.start_capture().await.unwrap();
        let mut first = f.encoders.streams().remove(0);
        f.clock.tick();
        assert!(first.changed().await);
        f.controller.stop_capture().await.unwrap();

        f.controller.start_capture().await.unwrap();
        let second = f.encoders.streams().remove(1);
        assert!(second.latest().is_none());
        f.controller.stop_capture().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_capture() {
        let mut f = ready(CaptureConfig::default(), vec![vec![1; 4]]);
        f.controller.start_capture().await.unwrap();

        f.controller.shutdown().await;
        assert_eq!(f.controller.state(), CaptureState::Idle);
        assert_eq!(f.clock.registrations(), 0);
        assert!(f.controller.artifact().is_some());
    }
}
