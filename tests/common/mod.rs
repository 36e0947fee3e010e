#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wr_advisor::{AdvisorError, AdvisorResult, CoachModel};
use wr_capture::{
    CaptureError, CaptureResult, CaptureSourceAdapter, MediaConstraints, Platform,
    TrackEndNotifier, TrackFactory, TrackKind, VideoTrack,
};
use wr_state::{AnalysisResult, ImagePayload, MatchupState, RecognitionResult};
use wr_tactician_lib::{SyncTiming, TacticianConfig};

pub const WAIT: Duration = Duration::from_secs(5);

/// Fail the test instead of hanging
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting")
}

/// Poll `check` until it holds
pub async fn eventually<F: Fn() -> bool>(check: F) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

pub fn recognition(my: &str, enemy: &str, items: &[&str]) -> RecognitionResult {
    RecognitionResult {
        my_hero: my.into(),
        enemy_hero: enemy.into(),
        enemy_items: items.iter().map(|s| s.to_string()).collect(),
    }
}

pub enum Step {
    Ok(RecognitionResult),
    Fail,
}

/// Scripted model. Recognition answers come from `script`, then `fallback`.
/// Analysis echoes the enemy hero.
pub struct FakeModel {
    script: Mutex<VecDeque<Step>>,
    fallback: RecognitionResult,
    pub recognize_delay: Duration,
    pub recognize_calls: AtomicUsize,
    pub recognize_done: AtomicUsize,
    pub analyzed: Mutex<Vec<MatchupState>>,
    pub fail_analysis: AtomicBool,
}

impl FakeModel {
    pub fn new(fallback: RecognitionResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            recognize_delay: Duration::ZERO,
            recognize_calls: AtomicUsize::new(0),
            recognize_done: AtomicUsize::new(0),
            analyzed: Mutex::new(Vec::new()),
            fail_analysis: AtomicBool::new(false),
        }
    }

    pub fn with_script(self, steps: Vec<Step>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.recognize_delay = delay;
        self
    }

    pub fn recognitions(&self) -> usize {
        self.recognize_done.load(Ordering::SeqCst)
    }

    pub fn analyses(&self) -> Vec<MatchupState> {
        self.analyzed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CoachModel for FakeModel {
    async fn recognize(&self, _image: &ImagePayload) -> AdvisorResult<RecognitionResult> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        tokio::time::sleep(self.recognize_delay).await;
        self.recognize_done.fetch_add(1, Ordering::SeqCst);
        match step {
            Some(Step::Ok(result)) => Ok(result),
            Some(Step::Fail) => Err(AdvisorError::MalformedResponse("scripted failure".into())),
            None => Ok(self.fallback.clone()),
        }
    }

    async fn analyze(&self, matchup: &MatchupState) -> AdvisorResult<AnalysisResult> {
        self.analyzed.lock().unwrap().push(matchup.clone());
        if self.fail_analysis.load(Ordering::SeqCst) {
            return Err(AdvisorError::Api {
                status: 503,
                body: "overloaded".into(),
            });
        }
        Ok(AnalysisResult {
            matchup_analysis: format!("{} 对线 {}", matchup.my_hero, matchup.enemy_hero),
            recommended_items: vec![],
            combos: vec![],
            strategy_tips: vec!["控线".into()],
        })
    }
}

/// Track whose source can be made to vanish or start failing
pub struct FakeTrack {
    kind: TrackKind,
    gone: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
    watcher: Arc<Mutex<Option<TrackEndNotifier>>>,
}

impl VideoTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> String {
        format!("fake {}", self.kind)
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        Some((64, 36))
    }

    fn grab(&self) -> CaptureResult<RgbaImage> {
        if self.gone.load(Ordering::SeqCst) {
            return Err(CaptureError::TrackEnded("source closed".into()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CaptureError::Backend("device lost".into()));
        }
        Ok(RgbaImage::from_pixel(64, 36, Rgba([1, 10, 19, 255])))
    }

    fn on_end(&self, notifier: TrackEndNotifier) {
        *self.watcher.lock().unwrap() = Some(notifier);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub enum Open {
    Track,
    Deny,
    Unsupported,
}

/// Factory that counts opens and hands out [`FakeTrack`]s
pub struct FakeFactory {
    kind: TrackKind,
    mode: Open,
    pub opened: AtomicUsize,
    pub gone: Arc<AtomicBool>,
    pub failing: Arc<AtomicBool>,
    pub stops: Arc<AtomicUsize>,
    watcher: Arc<Mutex<Option<TrackEndNotifier>>>,
}

impl FakeFactory {
    pub fn new(kind: TrackKind, mode: Open) -> Arc<Self> {
        Arc::new(Self {
            kind,
            mode,
            opened: AtomicUsize::new(0),
            gone: Arc::new(AtomicBool::new(false)),
            failing: Arc::new(AtomicBool::new(false)),
            stops: Arc::new(AtomicUsize::new(0)),
            watcher: Arc::new(Mutex::new(None)),
        })
    }

    pub fn opens(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Make the source disappear, as if the shared window closed
    pub fn vanish(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }

    /// Every later grab fails with a backend error, as an unplugged device does
    pub fn fail_grabs(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Report the end through the track's watcher, without any grab.
    /// Returns false if no open track registered one.
    pub fn signal_end(&self) -> bool {
        match self.watcher.lock().unwrap().as_ref() {
            Some(notifier) => notifier.notify(),
            None => false,
        }
    }
}

impl TrackFactory for FakeFactory {
    fn open(&self, _constraints: &MediaConstraints) -> CaptureResult<Box<dyn VideoTrack>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Open::Track => Ok(Box::new(FakeTrack {
                kind: self.kind,
                gone: self.gone.clone(),
                failing: self.failing.clone(),
                stops: self.stops.clone(),
                watcher: self.watcher.clone(),
            })),
            Open::Deny => Err(CaptureError::PermissionDenied("dismissed".into())),
            Open::Unsupported => Err(CaptureError::UnsupportedDevice("no device".into())),
        }
    }
}

/// Desktop adapter whose display backend is `display`; the camera must never be used
pub fn desktop_adapter(display: Arc<FakeFactory>) -> CaptureSourceAdapter {
    let camera = FakeFactory::new(TrackKind::Camera, Open::Unsupported);
    CaptureSourceAdapter::new(Platform::Desktop, camera, display)
}

pub fn fast_timing() -> SyncTiming {
    SyncTiming {
        warmup: Duration::from_millis(10),
        interval: Duration::from_millis(40),
    }
}

/// Config with the fast timing used by these tests
pub fn fast_config() -> TacticianConfig {
    let mut config = TacticianConfig::default();
    config.sync.warmup_ms = 10;
    config.sync.interval_secs = 1;
    config
}

/// A small PNG, as a user would upload it
pub fn png_bytes() -> Vec<u8> {
    let img = RgbaImage::from_pixel(32, 18, Rgba([200, 170, 110, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
