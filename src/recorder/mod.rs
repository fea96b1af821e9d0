//! Recording system module
//!
//! - `RecordingSession` feeds a frame stream to a chunked encoder
//! - `ArtifactAssembler` joins the recorded chunks into one downloadable object
//! - `CaptureController` drives compositing and recording together

pub mod artifact;
pub mod chunks;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod session;
pub mod state;

pub use artifact::{Artifact, ArtifactAssembler, DirectorySink, DownloadSink};
pub use chunks::{ChunkBuffer, MediaChunk};
pub use controller::{CaptureController, CaptureEvent, CaptureSummary, ControlSurface};
pub use encoder::{
    ChunkEncoder, Container, EncoderFactory, EncoderSettings, FfmpegEncoder, FfmpegEncoderFactory,
};
pub use error::{RecordingError, RecordingResult};
pub use session::{RecordingSession, SessionSummary};
pub use state::{CaptureConfig, CaptureState, RecordingState};
