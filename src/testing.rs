//! Scripted collaborators for unit tests

use crate::capture::FrameStream;
use crate::poller::{FetchError, ScalarValue, ValueFetcher};
use crate::recorder::{
    Artifact, ChunkEncoder, DownloadSink, EncoderFactory, EncoderSettings, MediaChunk,
    RecordingError, RecordingResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Replays a fixed list of fetch outcomes
pub(crate) struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<ScalarValue, FetchError>>>,
    repeat: Option<ScalarValue>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<ScalarValue, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always succeeds with `value`
    pub fn repeating(value: ScalarValue) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(value),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValueFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<ScalarValue, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(value) => Ok(value.clone()),
            None => Err(FetchError::Malformed("script exhausted".to_string())),
        }
    }

    fn describe(&self) -> &str {
        "scripted"
    }
}

/// Emits `on_start` chunks while running and `on_stop` chunks while closing
pub(crate) struct ScriptedEncoder {
    on_start: Vec<Vec<u8>>,
    on_stop: Vec<Vec<u8>>,
    fail_start: bool,
    fail_stop: bool,
    chunks: Option<mpsc::UnboundedSender<MediaChunk>>,
    task: Option<JoinHandle<()>>,
    seen: Option<Arc<Mutex<Vec<FrameStream>>>>,
}

impl ScriptedEncoder {
    pub fn new(on_start: Vec<Vec<u8>>, on_stop: Vec<Vec<u8>>) -> Self {
        Self {
            on_start,
            on_stop,
            fail_start: false,
            fail_stop: false,
            chunks: None,
            task: None,
            seen: None,
        }
    }

    /// Encoder whose start always fails
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    /// Deliver everything, then report a failed close
    pub fn failing_on_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }
}

#[async_trait]
impl ChunkEncoder for ScriptedEncoder {
    fn mime_type(&self) -> &str {
        "video/webm"
    }

    async fn start(
        &mut self,
        stream: FrameStream,
        chunks: mpsc::UnboundedSender<MediaChunk>,
    ) -> RecordingResult<()> {
        if let Some(seen) = &self.seen {
            seen.lock().push(stream);
        }
        if self.fail_start {
            return Err(RecordingError::EncoderUnavailable("scripted failure".to_string()));
        }

        let tx = chunks.clone();
        let script = std::mem::take(&mut self.on_start);
        self.task = Some(tokio::spawn(async move {
            for data in script {
                let _ = tx.send(MediaChunk::from(data));
            }
        }));
        self.chunks = Some(chunks);
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let Some(chunks) = self.chunks.take() else {
            return Err(RecordingError::SessionIdle);
        };
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        for data in std::mem::take(&mut self.on_stop) {
            let _ = chunks.send(MediaChunk::from(data));
        }
        if self.fail_stop {
            return Err(RecordingError::Encoder("ffmpeg exited with 1".to_string()));
        }
        Ok(())
    }
}

/// Hands out [`ScriptedEncoder`]s and remembers what it was asked for
#[derive(Default)]
pub(crate) struct ScriptedEncoderFactory {
    chunks: Vec<Vec<u8>>,
    fail: bool,
    fail_stop: bool,
    settings: Mutex<Vec<EncoderSettings>>,
    streams: Arc<Mutex<Vec<FrameStream>>>,
}

impl ScriptedEncoderFactory {
    /// Every encoder emits `chunks` while running
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Encoders deliver `chunks` but fail to close
    pub fn failing_on_stop(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            fail_stop: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<EncoderSettings> {
        self.settings.lock().clone()
    }

    /// Streams encoders were started with, in order
    pub fn streams(&self) -> Vec<FrameStream> {
        self.streams.lock().clone()
    }
}

impl EncoderFactory for ScriptedEncoderFactory {
    fn create(&self, settings: &EncoderSettings) -> Box<dyn ChunkEncoder> {
        self.settings.lock().push(*settings);
        let mut encoder = if self.fail {
            ScriptedEncoder::failing()
        } else {
            ScriptedEncoder::new(self.chunks.clone(), Vec::new())
        };
        encoder.fail_stop = self.fail_stop;
        encoder.seen = Some(self.streams.clone());
        Box::new(encoder)
    }
}

/// Collects delivered artifacts, or refuses them when `failing`
#[derive(Default)]
pub(crate) struct MemorySink {
    delivered: Mutex<Vec<Artifact>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Artifact> {
        self.delivered.lock().clone()
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, artifact: Artifact) -> RecordingResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RecordingError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "sink refused",
            )));
        }
        self.delivered.lock().push(artifact);
        Ok(())
    }
}
