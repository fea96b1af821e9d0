//! Chunked media encoders
//!
//! An encoder consumes a [`FrameStream`] and emits [`MediaChunk`]s, in
//! order, on the sender it is given. It drops that sender once it has fully
//! closed; the session uses this to know the chunk list is complete.

use super::chunks::MediaChunk;
use super::error::{RecordingError, RecordingResult};
use crate::capture::{FrameStream, Resolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Bytes read from the encoder per chunk, at most
const CHUNK_SIZE: usize = 64 * 1024;

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Webm,
    Mp4,
}

impl Container {
    /// File extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
        }
    }

    /// Media type attached to artifacts
    pub fn mime_type(&self) -> &'static str {
        match self {
            Container::Webm => "video/webm",
            Container::Mp4 => "video/mp4",
        }
    }

    /// FFmpeg video codec for this container
    pub fn video_codec(&self) -> &'static str {
        match self {
            Container::Webm => "libvpx",
            Container::Mp4 => "libx264",
        }
    }
}

impl std::str::FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webm" => Ok(Container::Webm),
            "mp4" => Ok(Container::Mp4),
            other => Err(format!("unknown container '{other}' (expected webm or mp4)")),
        }
    }
}

/// What an encoder is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub resolution: Resolution,
    pub fps: u32,
    pub container: Container,
}

/// A streaming encoder
#[async_trait]
pub trait ChunkEncoder: Send {
    /// Media type of the produced chunks
    fn mime_type(&self) -> &str;

    /// Start encoding `stream`, delivering chunks on `chunks` in order
    async fn start(
        &mut self,
        stream: FrameStream,
        chunks: mpsc::UnboundedSender<MediaChunk>,
    ) -> RecordingResult<()>;

    /// Flush and close. Every chunk has been sent when this returns.
    async fn stop(&mut self) -> RecordingResult<()>;
}

/// Creates one encoder per recording session
pub trait EncoderFactory: Send + Sync {
    fn create(&self, settings: &EncoderSettings) -> Box<dyn ChunkEncoder>;
}

/// Build the FFmpeg command line: raw RGBA on stdin, container on stdout
pub(crate) fn build_args(settings: &EncoderSettings) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgba",
        "-video_size",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(settings.resolution.to_string());
    args.extend(["-framerate".to_string(), settings.fps.to_string()]);
    args.extend(["-i", "-", "-c:v", settings.container.video_codec()].map(String::from));

    match settings.container {
        Container::Webm => {
            args.extend(
                ["-deadline", "realtime", "-cpu-used", "8", "-b:v", "2M"].map(String::from),
            );
        }
        Container::Mp4 => {
            args.extend(
                [
                    "-preset",
                    "veryfast",
                    "-movflags",
                    "frag_keyframe+empty_moov+default_base_moof",
                ]
                .map(String::from),
            );
        }
    }

    args.extend(
        ["-pix_fmt", "yuv420p", "-f", settings.container.extension(), "-"].map(String::from),
    );
    args
}

/// Encoder backed by an `ffmpeg` child process
pub struct FfmpegEncoder {
    settings: EncoderSettings,
    process: Option<Child>,
    running: Arc<AtomicBool>,
    writer: Option<JoinHandle<u64>>,
    reader: Option<JoinHandle<()>>,
}

impl FfmpegEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            process: None,
            running: Arc::new(AtomicBool::new(false)),
            writer: None,
            reader: None,
        }
    }
}

#[async_trait]
impl ChunkEncoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        self.settings.container.mime_type()
    }

    async fn start(
        &mut self,
        stream: FrameStream,
        chunks: mpsc::UnboundedSender<MediaChunk>,
    ) -> RecordingResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RecordingError::SessionActive);
        }

        let version = tokio::process::Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if version.is_err() {
            return Err(RecordingError::EncoderUnavailable(
                "FFmpeg not found. Please install FFmpeg and make sure it is on PATH".to_string(),
            ));
        }

        let mut process = Command::new("ffmpeg")
            .args(build_args(&self.settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let (Some(mut stdin), Some(mut stdout)) = (process.stdin.take(), process.stdout.take())
        else {
            let _ = process.kill();
            return Err(RecordingError::Encoder(
                "Failed to capture FFmpeg pipes".to_string(),
            ));
        };

        self.running.store(true, Ordering::SeqCst);

        let settings = self.settings;
        let running = self.running.clone();
        let writer = std::thread::spawn(move || {
            let period = Duration::from_secs(1) / settings.fps.max(1);
            let mut next_frame = Instant::now();
            let mut frames_written: u64 = 0;

            while running.load(Ordering::SeqCst) {
                // Constant frame rate: repeat the latest frame if nothing new arrived
                if let Some(frame) = stream.latest() {
                    let result = if frame.resolution() == settings.resolution {
                        stdin.write_all(&frame.data)
                    } else {
                        stdin.write_all(&frame.resized(settings.resolution).data)
                    };
                    if let Err(e) = result {
                        tracing::warn!("FFmpeg stdin closed: {}", e);
                        break;
                    }
                    frames_written += 1;
                }

                next_frame += period;
                let now = Instant::now();
                if next_frame > now {
                    std::thread::sleep(next_frame - now);
                } else {
                    next_frame = now;
                }
            }

            // Closing stdin signals EOF to FFmpeg
            drop(stdin);
            frames_written
        });

        let reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunks.send(MediaChunk::from(buf[..n].to_vec())).is_err() {
                            tracing::warn!("Chunk receiver dropped, discarding encoder output");
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("Failed to read FFmpeg output: {}", e);
                        break;
                    }
                }
            }
        });

        tracing::info!(
            "Started FFmpeg encoder: {} @ {}fps, codec={}, container={}",
            self.settings.resolution,
            self.settings.fps,
            self.settings.container.video_codec(),
            self.settings.container.extension()
        );

        self.process = Some(process);
        self.writer = Some(writer);
        self.reader = Some(reader);
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(RecordingError::SessionIdle);
        }

        let writer = self.writer.take();
        let process = self.process.take();
        let reader = self.reader.take();

        let outcome = tokio::task::spawn_blocking(move || {
            let frames = writer.and_then(|handle| handle.join().ok()).unwrap_or(0);
            let status = match process {
                Some(mut process) => Some(process.wait()),
                None => None,
            };
            if let Some(handle) = reader {
                let _ = handle.join();
            }
            (frames, status)
        })
        .await
        .map_err(|e| RecordingError::Encoder(format!("Encoder shutdown task failed: {e}")))?;

        let (frames, status) = outcome;
        match status {
            Some(Ok(status)) if status.success() => {
                tracing::info!("FFmpeg encoder finished: {} frames", frames);
                Ok(())
            }
            Some(Ok(status)) => Err(RecordingError::Encoder(format!(
                "FFmpeg exited with {status}"
            ))),
            Some(Err(e)) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

/// Produces [`FfmpegEncoder`]s
#[derive(Debug, Default, Clone)]
pub struct FfmpegEncoderFactory;

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, settings: &EncoderSettings) -> Box<dyn ChunkEncoder> {
        Box::new(FfmpegEncoder::new(*settings))
    }
}
