use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{CaptureError, CaptureResult};

/// Where a track's pixels come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Camera,
    Display,
    Still,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera => f.write_str("camera"),
            Self::Display => f.write_str("display"),
            Self::Still => f.write_str("still"),
        }
    }
}

/// Backend errors in a row after which a stream counts as ended
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// One live video track produced by a capture backend.
///
/// `grab` is blocking and may be called from several threads at once.
/// A backend that notices its device went away returns [`CaptureError::TrackEnded`]
/// from `grab`, or reports it through the notifier handed to [`VideoTrack::on_end`]
/// when nobody is grabbing.
pub trait VideoTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Human readable source name (monitor, window title or camera name)
    fn label(&self) -> String;

    /// Native resolution of the source, if known without grabbing
    fn resolution(&self) -> Option<(u32, u32)> {
        None
    }

    fn grab(&self) -> CaptureResult<RgbaImage>;

    /// Called once when the track joins a stream. Backends that can watch
    /// their source keep `notifier` and fire it when the source goes away.
    fn on_end(&self, notifier: TrackEndNotifier) {
        let _ = notifier;
    }

    /// Release the device. Must be idempotent.
    fn stop(&self);
}

/// Signals that a stream's tracks ended outside of our control
/// (permission revoked, device unplugged, shared window closed).
#[derive(Clone)]
pub struct TrackEndNotifier {
    ended: Arc<watch::Sender<bool>>,
}

impl TrackEndNotifier {
    /// Returns true if this call is the one that ended the stream
    pub fn notify(&self) -> bool {
        self.ended.send_if_modified(|ended| {
            if *ended {
                false
            } else {
                *ended = true;
                true
            }
        })
    }
}

struct StreamInner {
    tracks: Vec<Box<dyn VideoTrack>>,
    stopped: AtomicBool,
    ended: Arc<watch::Sender<bool>>,
    failures: AtomicU32,
}

/// Uniform handle over whatever the capture adapter acquired.
///
/// Cheap to clone; every clone refers to the same tracks.
#[derive(Clone)]
pub struct StreamHandle {
    inner: Arc<StreamInner>,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("kind", &self.kind())
            .field("label", &self.label())
            .field("stopped", &self.is_stopped())
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl StreamHandle {
    pub fn new(track: Box<dyn VideoTrack>) -> Self {
        Self::with_tracks(vec![track])
    }

    pub fn with_tracks(tracks: Vec<Box<dyn VideoTrack>>) -> Self {
        let (ended, _) = watch::channel(false);
        let handle = Self {
            inner: Arc::new(StreamInner {
                tracks,
                stopped: AtomicBool::new(false),
                ended: Arc::new(ended),
                failures: AtomicU32::new(0),
            }),
        };
        for track in &handle.inner.tracks {
            track.on_end(handle.end_notifier());
        }
        handle
    }

    fn video_track(&self) -> Option<&dyn VideoTrack> {
        self.inner.tracks.first().map(|t| t.as_ref())
    }

    pub fn kind(&self) -> Option<TrackKind> {
        self.video_track().map(|t| t.kind())
    }

    pub fn label(&self) -> String {
        self.video_track().map(|t| t.label()).unwrap_or_default()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.video_track().and_then(|t| t.resolution())
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn is_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }

    pub fn is_active(&self) -> bool {
        !self.is_stopped() && !self.is_ended()
    }

    /// Grab the current frame of the video track (blocking).
    ///
    /// [`MAX_CONSECUTIVE_FAILURES`] backend errors in a row end the stream.
    pub fn grab_frame(&self) -> CaptureResult<RgbaImage> {
        if !self.is_active() {
            return Err(CaptureError::NoFrameAvailable);
        }
        let track = self.video_track().ok_or(CaptureError::NoFrameAvailable)?;
        match track.grab() {
            Ok(frame) => {
                self.inner.failures.store(0, Ordering::Relaxed);
                Ok(frame)
            }
            Err(CaptureError::TrackEnded(reason)) => {
                self.end(&reason);
                Err(CaptureError::TrackEnded(reason))
            }
            Err(CaptureError::Backend(reason)) => {
                let failures = self.inner.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures < MAX_CONSECUTIVE_FAILURES {
                    debug!(failures, "Capture backend error: {}", reason);
                    return Err(CaptureError::Backend(reason));
                }
                let reason = format!("{} ({} failures in a row)", reason, failures);
                self.end(&reason);
                Err(CaptureError::TrackEnded(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn end(&self, reason: &str) {
        if self.end_notifier().notify() {
            info!("Capture track ended: {}", reason);
        }
    }

    /// Stop every track. Returns false if the stream was already stopped.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        for track in &self.inner.tracks {
            track.stop();
        }
        debug!("Stopped {} capture track(s)", self.inner.tracks.len());
        true
    }

    /// Handle a backend (or a test) uses to report external termination
    pub fn end_notifier(&self) -> TrackEndNotifier {
        TrackEndNotifier {
            ended: self.inner.ended.clone(),
        }
    }

    /// Resolves once the stream ended outside of our control.
    /// Never resolves for a stream that is only stopped.
    pub async fn ended(&self) {
        let mut rx = self.inner.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }
}

/// A track that serves one fixed image, used for uploaded screenshots
pub struct StillTrack {
    image: RgbaImage,
    label: String,
}

impl StillTrack {
    pub fn new(image: RgbaImage, label: impl Into<String>) -> Self {
        Self {
            image,
            label: label.into(),
        }
    }
}

impl VideoTrack for StillTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Still
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        Some(self.image.dimensions())
    }

    fn grab(&self) -> CaptureResult<RgbaImage> {
        Ok(self.image.clone())
    }

    fn stop(&self) {}
}
