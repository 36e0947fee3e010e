//! Camera capture through `nokhwa`.
//!
//! `nokhwa::Camera` is not `Send`, so each track owns a dedicated thread that
//! opens the device and answers grab requests over a channel. Between
//! requests the thread re-queries the device list and ends the track once
//! the camera is unplugged.

use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::{Camera, NokhwaError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, CaptureResult};
use crate::source::{select_camera, MediaConstraints, TrackFactory};
use crate::stream::{TrackEndNotifier, TrackKind, VideoTrack};

/// How long the camera thread idles before checking the device is still there
const WATCH_INTERVAL: Duration = Duration::from_secs(1);

enum Command {
    Grab(mpsc::SyncSender<CaptureResult<RgbaImage>>),
    Watch(TrackEndNotifier),
    Stop,
}

/// A failed query counts as present; only a listing without us is an unplug
fn device_present(index: &CameraIndex) -> bool {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras.iter().any(|c| c.index() == index),
        Err(e) => {
            debug!("Camera query failed: {}", e);
            true
        }
    }
}

fn classify(err: NokhwaError) -> CaptureError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied(message)
    } else {
        match err {
            NokhwaError::OpenDeviceError(_, _) | NokhwaError::OpenStreamError(_) => {
                CaptureError::PermissionDenied(message)
            }
            _ => CaptureError::UnsupportedDevice(message),
        }
    }
}

/// Opens camera tracks
#[derive(Debug, Default)]
pub struct CameraFactory;

impl CameraFactory {
    pub fn new() -> Self {
        Self
    }
}

impl TrackFactory for CameraFactory {
    fn open(&self, constraints: &MediaConstraints) -> CaptureResult<Box<dyn VideoTrack>> {
        let (facing, exact) = match constraints {
            MediaConstraints::Camera { facing, exact } => (*facing, *exact),
            MediaConstraints::Display { .. } => {
                return Err(CaptureError::UnsupportedDevice(
                    "Camera backend cannot capture a display".into(),
                ))
            }
        };

        let cameras = nokhwa::query(ApiBackend::Auto).map_err(classify)?;
        let names: Vec<String> = cameras.iter().map(|c| c.human_name()).collect();
        debug!("Cameras: {:?}", names);

        let idx = select_camera(&names, facing, exact).ok_or_else(|| {
            CaptureError::UnsupportedDevice(format!("No {:?}-facing camera found", facing))
        })?;
        let index = cameras[idx].index().clone();
        let label = names[idx].clone();

        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        std::thread::Builder::new()
            .name("wr-camera".into())
            .spawn(move || camera_thread(index, command_rx, ready_tx))
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        let resolution = ready_rx
            .recv()
            .map_err(|_| CaptureError::UnsupportedDevice("Camera thread exited".into()))??;

        info!("Camera opened: {} {}x{}", label, resolution.0, resolution.1);

        Ok(Box::new(CameraTrack {
            commands,
            label,
            resolution,
            stopped: AtomicBool::new(false),
        }))
    }
}

fn grab_frame(camera: &mut Camera) -> CaptureResult<RgbaImage> {
    let buffer = camera
        .frame()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;
    let decoded = buffer
        .decode_image::<RgbAFormat>()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;
    let (width, height) = decoded.dimensions();
    RgbaImage::from_raw(width, height, decoded.into_raw())
        .ok_or_else(|| CaptureError::Backend("Camera frame has unexpected size".into()))
}

fn camera_thread(
    index: CameraIndex,
    commands: mpsc::Receiver<Command>,
    ready: mpsc::SyncSender<CaptureResult<(u32, u32)>>,
) {
    let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
    let mut camera = match Camera::new(index.clone(), format) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(classify(e)));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(classify(e)));
        return;
    }

    let resolution = camera.resolution();
    if ready
        .send(Ok((resolution.width(), resolution.height())))
        .is_err()
    {
        let _ = camera.stop_stream();
        return;
    }

    let mut notifier: Option<TrackEndNotifier> = None;
    let unplugged = |notifier: &Option<TrackEndNotifier>| {
        if let Some(notifier) = notifier {
            if notifier.notify() {
                info!("Camera disconnected");
            }
        }
    };

    // Ends on Stop, when the track is dropped or when the device goes away
    loop {
        match commands.recv_timeout(WATCH_INTERVAL) {
            Ok(Command::Grab(reply)) => match grab_frame(&mut camera) {
                Err(CaptureError::Backend(message)) if !device_present(&index) => {
                    let _ = reply.send(Err(CaptureError::TrackEnded(format!(
                        "camera disconnected: {}",
                        message
                    ))));
                    unplugged(&notifier);
                    break;
                }
                frame => {
                    let _ = reply.send(frame);
                }
            },
            Ok(Command::Watch(end)) => notifier = Some(end),
            Ok(Command::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if notifier.is_some() && !device_present(&index) {
                    unplugged(&notifier);
                    break;
                }
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Failed to stop camera stream: {}", e);
    }
    debug!("Camera thread exited");
}

/// A rear camera pointed at the device running the game
pub struct CameraTrack {
    commands: mpsc::Sender<Command>,
    label: String,
    resolution: (u32, u32),
    stopped: AtomicBool,
}

impl VideoTrack for CameraTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Camera
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        Some(self.resolution)
    }

    fn grab(&self) -> CaptureResult<RgbaImage> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(CaptureError::NoFrameAvailable);
        }
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.commands
            .send(Command::Grab(reply_tx))
            .map_err(|_| CaptureError::TrackEnded("camera released".into()))?;
        reply_rx
            .recv()
            .map_err(|_| CaptureError::TrackEnded("camera released".into()))?
    }

    fn on_end(&self, notifier: TrackEndNotifier) {
        if self.commands.send(Command::Watch(notifier)).is_err() {
            debug!("Camera thread already gone");
        }
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let _ = self.commands.send(Command::Stop);
        }
    }
}
