//! Display and window capture through `xcap`.
//!
//! `xcap` handles are re-resolved by id on every grab so a track never holds
//! platform handles across threads. A monitor or window that disappears ends
//! the track, whether a grab notices it or the watcher thread does.

use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use xcap::{Monitor, Window};

use crate::error::{CaptureError, CaptureResult};
use crate::source::{MediaConstraints, TrackFactory};
use crate::stream::{TrackEndNotifier, TrackKind, VideoTrack};

/// How often the watcher checks that the captured target still exists
const WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
enum Target {
    Monitor(u32),
    Window(u32),
}

/// Opens display capture tracks
#[derive(Debug, Default)]
pub struct DisplayFactory;

impl DisplayFactory {
    pub fn new() -> Self {
        Self
    }
}

/// Map an xcap failure to our taxonomy. The OS reports missing screen
/// recording permission as an ordinary error, so look at the message.
fn classify(err: xcap::XCapError) -> CaptureError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::UnsupportedDevice(message)
    }
}

/// Find a window whose title contains `needle` (case-insensitive)
fn find_window(needle: &str) -> CaptureResult<(u32, String)> {
    let needle = needle.to_lowercase();
    let windows = Window::all().map_err(classify)?;

    for window in windows {
        let title = match window.title() {
            Ok(t) => t,
            Err(_) => continue,
        };
        if window.is_minimized().unwrap_or(false) {
            continue;
        }
        if title.to_lowercase().contains(&needle) {
            let id = window.id().map_err(classify)?;
            debug!("Found capture window: {} (id {})", title, id);
            return Ok((id, title));
        }
    }

    Err(CaptureError::UnsupportedDevice(format!(
        "No window matching \"{}\"",
        needle
    )))
}

fn primary_monitor() -> CaptureResult<(u32, String)> {
    let monitors = Monitor::all().map_err(classify)?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary().unwrap_or(false))
        .or_else(|| monitors.first())
        .ok_or_else(|| CaptureError::UnsupportedDevice("No monitor found".into()))?;

    let id = monitor.id().map_err(classify)?;
    let name = monitor.name().unwrap_or_else(|_| format!("Monitor {}", id));
    Ok((id, name))
}

impl TrackFactory for DisplayFactory {
    fn open(&self, constraints: &MediaConstraints) -> CaptureResult<Box<dyn VideoTrack>> {
        let window_title = match constraints {
            MediaConstraints::Display { window_title, .. } => window_title.clone(),
            MediaConstraints::Camera { .. } => {
                return Err(CaptureError::UnsupportedDevice(
                    "Display backend cannot open a camera".into(),
                ))
            }
        };

        let (target, label) = match window_title {
            Some(title) => {
                let (id, label) = find_window(&title)?;
                (Target::Window(id), label)
            }
            None => {
                let (id, label) = primary_monitor()?;
                (Target::Monitor(id), label)
            }
        };

        let track = DisplayTrack {
            target,
            label,
            stopped: Arc::new(AtomicBool::new(false)),
        };

        // Grab once so a missing screen-recording permission fails here, not in the loop
        track.grab().map_err(|e| match e {
            CaptureError::Backend(message) => CaptureError::PermissionDenied(message),
            other => other,
        })?;

        Ok(Box::new(track))
    }
}

/// A monitor or window being captured
pub struct DisplayTrack {
    target: Target,
    label: String,
    stopped: Arc<AtomicBool>,
}

impl Target {
    /// `None` when the platform could not list targets this time
    fn exists(self) -> Option<bool> {
        match self {
            Target::Monitor(id) => Monitor::all()
                .ok()
                .map(|all| all.iter().any(|m| m.id().ok() == Some(id))),
            Target::Window(id) => Window::all()
                .ok()
                .map(|all| all.iter().any(|w| w.id().ok() == Some(id))),
        }
    }
}

/// Poll for the target until it disappears or the track is stopped
fn watch_target(target: Target, stopped: Arc<AtomicBool>, notifier: TrackEndNotifier) {
    while !stopped.load(Ordering::Acquire) {
        std::thread::sleep(WATCH_INTERVAL);
        if stopped.load(Ordering::Acquire) {
            break;
        }
        if target.exists() == Some(false) {
            if notifier.notify() {
                info!("Capture target {:?} disappeared", target);
            }
            break;
        }
    }
    debug!("Display watcher exited");
}

impl DisplayTrack {
    fn capture_monitor(id: u32) -> CaptureResult<RgbaImage> {
        let monitors = Monitor::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.id().ok() == Some(id))
            .ok_or_else(|| CaptureError::TrackEnded("monitor disconnected".into()))?;
        monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))
    }

    fn capture_window(id: u32) -> CaptureResult<RgbaImage> {
        let windows = Window::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
        let window = windows
            .into_iter()
            .find(|w| w.id().ok() == Some(id))
            .ok_or_else(|| CaptureError::TrackEnded("window closed".into()))?;
        window
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))
    }
}

impl VideoTrack for DisplayTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Display
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn grab(&self) -> CaptureResult<RgbaImage> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(CaptureError::NoFrameAvailable);
        }
        // xcap never draws the cursor, which is what we want
        let frame = match self.target {
            Target::Monitor(id) => Self::capture_monitor(id),
            Target::Window(id) => Self::capture_window(id),
        };
        if let Err(ref e) = frame {
            warn!("Display grab failed for {}: {}", self.label, e);
        }
        frame
    }

    fn on_end(&self, notifier: TrackEndNotifier) {
        let target = self.target;
        let stopped = self.stopped.clone();
        let spawned = std::thread::Builder::new()
            .name("wr-display-watch".into())
            .spawn(move || watch_target(target, stopped, notifier));
        if let Err(e) = spawned {
            warn!("Display watcher not started, relying on grabs: {}", e);
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}
