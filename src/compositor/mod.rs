//! Overlay compositing
//!
//! Every display tick the compositor paints the latest camera frame onto a
//! fixed-size surface, draws the badge on top and publishes the result as a
//! capturable frame stream.

pub mod badge;
pub mod clock;
pub mod font;
pub mod overlay;
pub mod surface;

pub use badge::BadgeLayout;
pub use clock::{DisplayClock, ManualClock, TickScheduler, TickSource};
pub use overlay::{compose, CompositorStats, OverlayCompositor};
pub use surface::{CompositeSurface, Rgb};
