use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CaptureError, CaptureResult};
use crate::stream::{StreamHandle, VideoTrack};

/// Configured platform override
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformHint {
    /// Detect from the compile target
    #[default]
    Auto,
    /// Treat the device as camera-only
    Camera,
    /// Treat the device as able to share its screen
    Display,
}

/// What kind of device we are running on, as far as capture is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Mobile targets without screen capture. Point the rear camera at the game instead.
    Constrained,
    /// Desktop targets that can capture a display or window
    Desktop,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(any(target_os = "ios", target_os = "android")) {
            Self::Constrained
        } else {
            Self::Desktop
        }
    }

    pub fn from_hint(hint: PlatformHint) -> Self {
        match hint {
            PlatformHint::Auto => Self::detect(),
            PlatformHint::Camera => Self::Constrained,
            PlatformHint::Display => Self::Desktop,
        }
    }
}

/// How a live stream is obtained on a given platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureStrategy {
    RearCamera,
    Display,
}

impl CaptureStrategy {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Constrained => Self::RearCamera,
            Platform::Desktop => Self::Display,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera
    Environment,
    /// Selfie camera
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    Never,
    Always,
}

/// Request passed to a backend when opening a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaConstraints {
    Camera {
        facing: FacingMode,
        /// Fail instead of falling back to another camera
        exact: bool,
    },
    Display {
        cursor: CursorMode,
        audio: bool,
        /// Capture a window whose title contains this, instead of a whole monitor
        window_title: Option<String>,
    },
}

impl MediaConstraints {
    pub fn for_strategy(strategy: CaptureStrategy, window_title: Option<String>) -> Self {
        match strategy {
            CaptureStrategy::RearCamera => Self::Camera {
                facing: FacingMode::Environment,
                exact: true,
            },
            CaptureStrategy::Display => Self::Display {
                cursor: CursorMode::Never,
                audio: false,
                window_title,
            },
        }
    }
}

/// Pick a camera by its reported name. Desktop camera APIs expose no facing
/// metadata, so the name is all there is to go on. With `exact` set and no
/// name matching, there is no acceptable camera.
pub fn select_camera<S: AsRef<str>>(names: &[S], facing: FacingMode, exact: bool) -> Option<usize> {
    const REAR: &[&str] = &["back", "rear", "environment", "后置"];
    const FRONT: &[&str] = &["front", "user", "facetime", "前置"];

    let keywords = match facing {
        FacingMode::Environment => REAR,
        FacingMode::User => FRONT,
    };
    let matched = names.iter().position(|name| {
        let name = name.as_ref().to_lowercase();
        keywords.iter().any(|k| name.contains(k))
    });

    match matched {
        Some(idx) => Some(idx),
        None if exact => None,
        None if names.is_empty() => None,
        None => Some(0),
    }
}

/// A capture backend able to open tracks (camera devices, display capture)
pub trait TrackFactory: Send + Sync {
    /// Open a track. May block on a permission prompt.
    fn open(&self, constraints: &MediaConstraints) -> CaptureResult<Box<dyn VideoTrack>>;
}

/// Stand-in for a backend that was compiled out
pub struct UnsupportedFactory {
    what: &'static str,
}

impl UnsupportedFactory {
    pub fn new(what: &'static str) -> Self {
        Self { what }
    }
}

impl TrackFactory for UnsupportedFactory {
    fn open(&self, _constraints: &MediaConstraints) -> CaptureResult<Box<dyn VideoTrack>> {
        Err(CaptureError::UnsupportedDevice(format!(
            "{} is not available in this build",
            self.what
        )))
    }
}

/// Turns a platform into a live [`StreamHandle`].
/// Callers never see which backend was used.
pub struct CaptureSourceAdapter {
    platform: Platform,
    window_title: Option<String>,
    camera: Arc<dyn TrackFactory>,
    display: Arc<dyn TrackFactory>,
}

impl CaptureSourceAdapter {
    pub fn new(
        platform: Platform,
        camera: Arc<dyn TrackFactory>,
        display: Arc<dyn TrackFactory>,
    ) -> Self {
        Self {
            platform,
            window_title: None,
            camera,
            display,
        }
    }

    /// Adapter wired to whichever native backends this build includes
    pub fn native(platform: Platform) -> Self {
        #[cfg(feature = "camera")]
        let camera: Arc<dyn TrackFactory> = Arc::new(crate::camera::CameraFactory::new());
        #[cfg(not(feature = "camera"))]
        let camera: Arc<dyn TrackFactory> = Arc::new(UnsupportedFactory::new("Camera capture"));

        #[cfg(feature = "screen")]
        let display: Arc<dyn TrackFactory> = Arc::new(crate::screen::DisplayFactory::new());
        #[cfg(not(feature = "screen"))]
        let display: Arc<dyn TrackFactory> = Arc::new(UnsupportedFactory::new("Screen capture"));

        Self::new(platform, camera, display)
    }

    pub fn with_window_title(mut self, title: Option<String>) -> Self {
        self.window_title = title.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn strategy(&self) -> CaptureStrategy {
        CaptureStrategy::for_platform(self.platform)
    }

    /// Acquire a stream using the platform's strategy.
    pub async fn acquire(&self) -> CaptureResult<StreamHandle> {
        let strategy = self.strategy();
        let constraints = MediaConstraints::for_strategy(strategy, self.window_title.clone());
        let factory = match strategy {
            CaptureStrategy::RearCamera => self.camera.clone(),
            CaptureStrategy::Display => self.display.clone(),
        };

        info!("Acquiring capture stream ({:?})", strategy);

        let opened = tokio::task::spawn_blocking(move || factory.open(&constraints))
            .await
            .map_err(|e| CaptureError::UnsupportedDevice(format!("capture task failed: {}", e)))?;

        match opened {
            Ok(track) => {
                info!("Capture stream acquired: {} ({})", track.label(), track.kind());
                Ok(StreamHandle::new(track))
            }
            Err(e) => {
                warn!("Failed to acquire capture stream: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_per_platform() {
        assert_eq!(
            CaptureStrategy::for_platform(Platform::Constrained),
            CaptureStrategy::RearCamera
        );
        assert_eq!(
            CaptureStrategy::for_platform(Platform::Desktop),
            CaptureStrategy::Display
        );
        assert_eq!(Platform::from_hint(PlatformHint::Camera), Platform::Constrained);
        assert_eq!(Platform::from_hint(PlatformHint::Display), Platform::Desktop);
    }

    #[test]
    fn test_constraints() {
        assert_eq!(
            MediaConstraints::for_strategy(CaptureStrategy::RearCamera, Some("ignored".into())),
            MediaConstraints::Camera {
                facing: FacingMode::Environment,
                exact: true
            }
        );
        assert_eq!(
            MediaConstraints::for_strategy(CaptureStrategy::Display, None),
            MediaConstraints::Display {
                cursor: CursorMode::Never,
                audio: false,
                window_title: None
            }
        );
    }

    #[test]
    fn test_select_camera() {
        let names = ["FaceTime HD Camera", "Back Dual Wide Camera"];
        assert_eq!(select_camera(&names, FacingMode::Environment, true), Some(1));
        assert_eq!(select_camera(&names, FacingMode::User, true), Some(0));

        let webcam_only = ["Integrated Webcam"];
        assert_eq!(select_camera(&webcam_only, FacingMode::Environment, true), None);
        assert_eq!(select_camera(&webcam_only, FacingMode::Environment, false), Some(0));
        assert_eq!(select_camera::<&str>(&[], FacingMode::Environment, false), None);
    }

    #[tokio::test]
    async fn test_unsupported_backend() {
        let adapter = CaptureSourceAdapter::new(
            Platform::Desktop,
            Arc::new(UnsupportedFactory::new("Camera capture")),
            Arc::new(UnsupportedFactory::new("Screen capture")),
        );
        let err = adapter.acquire().await.unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedDevice(_)));
        assert!(!err.is_permission());
    }
}
