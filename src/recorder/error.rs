//! Recording errors

use thiserror::Error;

/// Errors surfaced by the recording pipeline
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Capture already in progress")]
    AlreadyCapturing,

    #[error("Capture is not capturing")]
    NotCapturing,

    #[error("A recording session is already active")]
    SessionActive,

    #[error("No recording session is active")]
    SessionIdle,

    #[error("Recording still in progress")]
    StillRecording,

    #[error("Frame source has not produced a frame yet")]
    SourceNotReady,

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;
