use thiserror::Error;

/// Errors that can occur while acquiring or sampling a capture stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The OS or the user refused access to the camera or the screen.
    #[error("Capture permission denied: {0}")]
    PermissionDenied(String),

    /// This device cannot provide the requested kind of stream.
    #[error("Capture not supported on this device: {0}")]
    UnsupportedDevice(String),

    /// No active stream or the stream produced no frame.
    #[error("No frame available")]
    NoFrameAvailable,

    /// The underlying track ended while grabbing.
    #[error("Capture track ended: {0}")]
    TrackEnded(String),

    /// The backend failed to produce this frame; the track is still usable.
    #[error("Capture backend error: {0}")]
    Backend(String),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Invalid image data: {0}")]
    InvalidImage(String),
}

impl CaptureError {
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;
