//! Live capture for the matchup tracker.
//!
//! [`CaptureSourceAdapter`] picks a rear camera or a display capture depending
//! on the platform and hands back a [`StreamHandle`]; [`FrameSampler`] turns
//! the handle's current frame into a JPEG [`wr_state::ImagePayload`].
//!
//! Native backends are opt-in: `screen` (xcap) and `camera` (nokhwa).

mod error;
mod sampler;
mod source;
mod stream;

#[cfg(feature = "camera")]
mod camera;
#[cfg(feature = "screen")]
mod screen;

pub use error::{CaptureError, CaptureResult};
pub use sampler::{encode_frame, strip_data_uri, FrameSampler, DEFAULT_JPEG_QUALITY};
pub use source::{
    select_camera, CaptureSourceAdapter, CaptureStrategy, CursorMode, FacingMode,
    MediaConstraints, Platform, PlatformHint, TrackFactory, UnsupportedFactory,
};
pub use stream::{
    StillTrack, StreamHandle, TrackEndNotifier, TrackKind, VideoTrack, MAX_CONSECUTIVE_FAILURES,
};

#[cfg(feature = "camera")]
pub use camera::{CameraFactory, CameraTrack};
#[cfg(feature = "screen")]
pub use screen::{DisplayFactory, DisplayTrack};
