//! Artifact assembly and hand-off

use super::error::{RecordingError, RecordingResult};
use super::session::RecordingSession;
use super::state::RecordingState;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Final recording, ready for download
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Bytes,
    pub mime_type: String,
    /// Suggested file name
    pub file_name: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Joins a finished session's chunks into an [`Artifact`]
#[derive(Debug, Clone)]
pub struct ArtifactAssembler {
    file_name: String,
    default_mime_type: String,
}

impl ArtifactAssembler {
    pub fn new(file_name: impl Into<String>, default_mime_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            default_mime_type: default_mime_type.into(),
        }
    }

    /// Assemble the session's buffered chunks and clear the buffer.
    ///
    /// Returns `Ok(None)` when there is nothing to assemble, so a second call
    /// without a new session is a no-op.
    pub fn assemble(&self, session: &mut RecordingSession) -> RecordingResult<Option<Artifact>> {
        if session.state() == RecordingState::Active {
            return Err(RecordingError::StillRecording);
        }

        let chunks = session.take_chunks();
        if chunks.is_empty() {
            tracing::debug!("No recorded chunks, nothing to assemble");
            return Ok(None);
        }

        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut data = BytesMut::with_capacity(total);
        for chunk in &chunks {
            data.extend_from_slice(chunk.as_bytes());
        }

        let artifact = Artifact {
            data: data.freeze(),
            mime_type: session
                .mime_type()
                .unwrap_or(&self.default_mime_type)
                .to_string(),
            file_name: self.file_name.clone(),
            chunk_count: chunks.len(),
            created_at: Utc::now(),
        };

        tracing::info!(
            "Assembled {} ({} bytes from {} chunks)",
            artifact.file_name,
            artifact.len(),
            artifact.chunk_count
        );
        Ok(Some(artifact))
    }
}

/// Receives finished artifacts
pub trait DownloadSink: Send + Sync {
    fn deliver(&self, artifact: Artifact) -> RecordingResult<()>;
}

/// Writes artifacts into a directory under their suggested name.
///
/// Existing files are never overwritten; a numeric suffix is added instead.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unique_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        let extension = path.extension().map(|e| e.to_string_lossy().to_string());

        (1u32..)
            .map(|n| match &extension {
                Some(ext) => self.dir.join(format!("{stem} ({n}).{ext}")),
                None => self.dir.join(format!("{stem} ({n})")),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, artifact: Artifact) -> RecordingResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.unique_path(&artifact.file_name);
        fs::write(&path, &artifact.data)?;

        tracing::info!(
            "Saved {} ({}, {} bytes)",
            path.display(),
            artifact.mime_type,
            artifact.len()
        );
        Ok(())
    }
}
