//! Live video sources
//!
//! A source publishes RGBA frames into a [`FrameStream`]; consumers read the
//! latest frame whenever they need one. The camera backend is only built
//! with the `camera` feature.

pub mod frame;
pub mod test_pattern;
pub mod traits;

#[cfg(feature = "camera")]
pub mod webcam;

pub use frame::{scale_nearest, VideoFrame};
pub use test_pattern::TestPatternSource;
pub use traits::{
    CameraInfo, CaptureError, FramePublisher, FrameSource, FrameStream, Resolution,
};
