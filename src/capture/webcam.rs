//! Webcam capture using nokhwa
//!
//! The camera is opened and read on a dedicated thread; decoded RGBA frames
//! are published into a [`FrameStream`].

use super::traits::{CameraInfo, CaptureError, FramePublisher, FrameSource, FrameStream, Resolution};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as CameraResolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| CameraInfo {
                id: match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                },
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

fn camera_index(device_id: Option<&str>) -> CameraIndex {
    match device_id {
        Some(id) => match id.parse::<u32>() {
            Ok(idx) => CameraIndex::Index(idx),
            Err(_) => CameraIndex::String(id.to_string()),
        },
        None => CameraIndex::Index(0),
    }
}

/// Live camera feed
pub struct WebcamSource {
    publisher: Arc<FramePublisher>,
    running: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
}

impl WebcamSource {
    /// Open a camera, asking for the format closest to `requested`.
    ///
    /// Blocks until the camera stream is open, so call it off the async
    /// executor. The stream resolution is whatever the camera granted.
    pub fn open(device_id: Option<&str>, requested: Resolution, fps: u32) -> Result<Self, CaptureError> {
        if list_cameras().is_empty() {
            return Err(CaptureError::NoDevice);
        }

        let index = camera_index(device_id);
        let device = index.to_string();
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<Arc<FramePublisher>, CaptureError>>(1);

        let thread_running = running.clone();
        let handle = std::thread::spawn(move || {
            let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(
                CameraFormat::new(
                    CameraResolution::new(requested.width, requested.height),
                    FrameFormat::MJPEG,
                    fps,
                ),
            ));

            let open = Camera::new(index.clone(), format).and_then(|mut camera| {
                camera.open_stream()?;
                Ok(camera)
            });
            let mut camera = match open {
                Ok(camera) => camera,
                Err(e) => {
                    let _ = ready_tx.send(Err(CaptureError::Open {
                        device: index.to_string(),
                        reason: e.to_string(),
                    }));
                    return;
                }
            };

            let granted = camera.camera_format();
            let resolution = Resolution::new(granted.resolution().width(), granted.resolution().height());
            tracing::info!(
                "Webcam opened: {} @ {}fps, format={:?} (requested {} @ {}fps)",
                resolution,
                granted.frame_rate(),
                granted.format(),
                requested,
                fps
            );

            let (publisher, _) = FrameStream::channel(resolution);
            let publisher = Arc::new(publisher);
            if ready_tx.send(Ok(publisher.clone())).is_err() {
                let _ = camera.stop_stream();
                return;
            }

            let mut frame_count: u64 = 0;
            while thread_running.load(Ordering::SeqCst) {
                // Blocks until the camera delivers the next frame
                let decoded = camera
                    .frame()
                    .and_then(|buffer| buffer.decode_image::<RgbAFormat>());
                match decoded {
                    Ok(image) => {
                        let (width, height) = image.dimensions();
                        if let Err(e) = publisher.publish_rgba(width, height, image.into_raw()) {
                            tracing::debug!("Dropping webcam frame: {}", e);
                            continue;
                        }
                        frame_count += 1;
                    }
                    Err(e) => {
                        tracing::debug!("Failed to capture frame: {:?}", e);
                    }
                }
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }
            tracing::info!("Webcam capture thread stopped after {} frames", frame_count);
        });

        let publisher = match ready_rx.recv() {
            Ok(Ok(publisher)) => publisher,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::Open {
                    device,
                    reason: "capture thread exited".to_string(),
                });
            }
        };

        Ok(Self {
            publisher,
            running,
            capture_thread: Some(handle),
        })
    }
}

impl FrameSource for WebcamSource {
    fn resolution(&self) -> Resolution {
        self.publisher.resolution()
    }

    fn stream(&self) -> FrameStream {
        self.publisher.stream()
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }
}
