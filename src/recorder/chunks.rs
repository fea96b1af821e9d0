//! Encoded media chunks

use bytes::Bytes;

/// One unit of encoder output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk(Bytes);

impl MediaChunk {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl From<Vec<u8>> for MediaChunk {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for MediaChunk {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

/// Append-only chunk list for one recording session.
///
/// Order is arrival order. Zero-length chunks are dropped on arrival.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<MediaChunk>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk`. Returns `false` if it was empty and dropped.
    pub fn push(&mut self, chunk: MediaChunk) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn chunks(&self) -> &[MediaChunk] {
        &self.chunks
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    /// Move all chunks out, leaving the buffer empty
    pub fn take(&mut self) -> Vec<MediaChunk> {
        self.total_bytes = 0;
        std::mem::take(&mut self.chunks)
    }
}
