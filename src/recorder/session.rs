//! Recording session: one encoder feeding one chunk buffer

use super::chunks::{ChunkBuffer, MediaChunk};
use super::encoder::ChunkEncoder;
use super::error::{RecordingError, RecordingResult};
use super::state::RecordingState;
use crate::capture::FrameStream;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long to wait for queued chunks after the encoder stopped
const COLLECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Information about a finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub mime_type: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub total_bytes: usize,
}

struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    encoder: Box<dyn ChunkEncoder>,
    collector: JoinHandle<usize>,
}

/// Records one stream at a time into an ordered [`ChunkBuffer`].
///
/// The buffer is reset when a session starts and stays readable after the
/// session stops, until the artifact is assembled.
pub struct RecordingSession {
    buffer: Arc<Mutex<ChunkBuffer>>,
    active: Option<ActiveSession>,
    mime_type: Option<String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(ChunkBuffer::new())),
            active: None,
            mime_type: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        if self.active.is_some() {
            RecordingState::Active
        } else {
            RecordingState::Idle
        }
    }

    /// Id of the active session
    pub fn id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Media type of the current or most recent session
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Number of chunks buffered so far
    pub fn chunk_count(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn total_bytes(&self) -> usize {
        self.buffer.lock().total_bytes()
    }

    /// Copy of the buffered chunks, in arrival order
    pub fn chunks(&self) -> Vec<MediaChunk> {
        self.buffer.lock().chunks().to_vec()
    }

    /// Start recording `stream` with `encoder`
    pub async fn start(
        &mut self,
        stream: FrameStream,
        mut encoder: Box<dyn ChunkEncoder>,
    ) -> RecordingResult<()> {
        if self.active.is_some() {
            return Err(RecordingError::SessionActive);
        }

        self.buffer.lock().clear();

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect_chunks(chunk_rx, self.buffer.clone()));

        if let Err(e) = encoder.start(stream, chunk_tx).await {
            // the encoder dropped its sender, so the collector ends on its own
            let _ = collector.await;
            tracing::error!("Failed to start encoder: {}", e);
            return Err(e);
        }

        let id = Uuid::new_v4();
        self.mime_type = Some(encoder.mime_type().to_string());
        tracing::info!("Recording session {} started ({})", id, encoder.mime_type());

        self.active = Some(ActiveSession {
            id,
            started_at: Utc::now(),
            encoder,
            collector,
        });
        Ok(())
    }

    /// Stop the encoder and wait until it has delivered its last chunk.
    ///
    /// The session is idle afterwards even if the encoder reported an error.
    pub async fn stop(&mut self) -> RecordingResult<SessionSummary> {
        let Some(active) = self.active.take() else {
            return Err(RecordingError::SessionIdle);
        };
        let ActiveSession {
            id,
            started_at,
            mut encoder,
            mut collector,
        } = active;

        let stopped = encoder.stop().await;
        // releases any sender the encoder still holds
        drop(encoder);

        if let Err(e) = &stopped {
            tracing::error!("Encoder failed to close cleanly: {}", e);
        }

        // chunks already queued are kept even when the encoder failed
        match tokio::time::timeout(COLLECT_TIMEOUT, &mut collector).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Chunk collector failed: {}", e),
            Err(_) => {
                tracing::warn!("Encoder still holds its chunk sender, dropping late chunks");
                collector.abort();
            }
        }

        let summary = {
            let buffer = self.buffer.lock();
            SessionSummary {
                session_id: id,
                mime_type: self.mime_type.clone().unwrap_or_default(),
                started_at,
                ended_at: Utc::now(),
                chunk_count: buffer.len(),
                total_bytes: buffer.total_bytes(),
            }
        };

        tracing::info!(
            "Recording session {} stopped: {} chunks, {} bytes",
            summary.session_id,
            summary.chunk_count,
            summary.total_bytes
        );

        stopped.map(|()| summary)
    }

    /// Move the buffered chunks out, leaving the buffer empty
    pub(crate) fn take_chunks(&mut self) -> Vec<MediaChunk> {
        self.buffer.lock().take()
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

async fn collect_chunks(
    mut chunk_rx: mpsc::UnboundedReceiver<MediaChunk>,
    buffer: Arc<Mutex<ChunkBuffer>>,
) -> usize {
    let mut dropped = 0;
    while let Some(chunk) = chunk_rx.recv().await {
        if !buffer.lock().push(chunk) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!("Dropped {} empty chunks", dropped);
    }
    dropped
}
