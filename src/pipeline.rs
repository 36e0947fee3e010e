use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use wr_advisor::CoachModel;
use wr_capture::{CaptureError, CaptureSourceAdapter, CaptureStrategy, FrameSampler, StreamHandle};
use wr_state::{ImagePayload, MergePolicy};

use crate::activity::Activity;
use crate::analysis::AnalysisQueue;
use crate::config::SyncSection;
use crate::store::MatchupStore;

/// Live sync lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Starting,
    Live,
    Stopping,
}

/// When recognition cycles run, relative to the start of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTiming {
    pub warmup: Duration,
    pub interval: Duration,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(1),
            interval: Duration::from_secs(15),
        }
    }
}

impl From<&SyncSection> for SyncTiming {
    fn from(section: &SyncSection) -> Self {
        Self {
            warmup: Duration::from_millis(section.warmup_ms),
            interval: Duration::from_secs(section.interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    Permission,
    Capability,
}

/// Live mode could not start. `Display` is the message shown to the user.
#[derive(Debug, Error)]
pub struct StartError {
    pub strategy: CaptureStrategy,
    pub failure: StartFailure,
    #[source]
    pub source: CaptureError,
}

impl StartError {
    fn new(strategy: CaptureStrategy, source: CaptureError) -> Self {
        let failure = match source {
            CaptureError::UnsupportedDevice(_) => StartFailure::Capability,
            _ => StartFailure::Permission,
        };
        Self {
            strategy,
            failure,
            source,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match (self.strategy, self.failure) {
            (CaptureStrategy::RearCamera, StartFailure::Permission) => "无法访问相机，请检查设置",
            (CaptureStrategy::RearCamera, StartFailure::Capability) => "当前设备没有可用的后置摄像头",
            (CaptureStrategy::Display, StartFailure::Permission) => "无法开启屏幕共享",
            (CaptureStrategy::Display, StartFailure::Capability) => "当前平台不支持屏幕共享",
        }
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

/// The stream and the tasks driving it. At most one exists at a time.
struct ActiveSession {
    id: u64,
    stream: StreamHandle,
    cycle: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

/// Everything a recognition cycle needs, shared with detached cycle tasks
struct CycleContext {
    sampler: FrameSampler,
    model: Arc<dyn CoachModel>,
    store: Arc<MatchupStore>,
    queue: Arc<AnalysisQueue>,
    state: watch::Receiver<SyncState>,
    activity: Arc<Activity>,
    /// Latest sampled frame, only while live
    frames: watch::Sender<Option<ImagePayload>>,
}

/// Drives capture → recognition → merge while live mode is on
pub struct SyncController {
    adapter: CaptureSourceAdapter,
    timing: SyncTiming,
    context: Arc<CycleContext>,
    state: watch::Sender<SyncState>,
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
    runtime: Handle,
}

impl SyncController {
    /// Must be called from inside a tokio runtime; later tasks are spawned on it
    pub fn new(
        adapter: CaptureSourceAdapter,
        sampler: FrameSampler,
        timing: SyncTiming,
        model: Arc<dyn CoachModel>,
        store: Arc<MatchupStore>,
        queue: Arc<AnalysisQueue>,
        activity: Arc<Activity>,
    ) -> Arc<Self> {
        let (state, state_rx) = watch::channel(SyncState::Idle);
        let (frames, _) = watch::channel(None);
        Arc::new(Self {
            adapter,
            timing,
            context: Arc::new(CycleContext {
                sampler,
                model,
                store,
                queue,
                state: state_rx,
                activity,
                frames,
            }),
            state,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            runtime: Handle::current(),
        })
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == SyncState::Live
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Frames sampled by live cycles; `None` once live mode ends
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<ImagePayload>> {
        self.context.frames.subscribe()
    }

    pub fn latest_frame(&self) -> Option<ImagePayload> {
        self.context.frames.borrow().clone()
    }

    pub fn strategy(&self) -> CaptureStrategy {
        self.adapter.strategy()
    }

    /// Label of the live stream, if any
    pub fn stream_label(&self) -> Option<String> {
        self.lock_active().as_ref().map(|a| a.stream.label())
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter live mode. Returns `Ok(false)` when already running, or when a
    /// stop arrived while the stream was being acquired.
    pub async fn start(self: &Arc<Self>) -> Result<bool, StartError> {
        let claimed = self.state.send_if_modified(|s| {
            if *s == SyncState::Idle {
                *s = SyncState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!("Start ignored in state {:?}", self.state());
            return Ok(false);
        }

        let strategy = self.adapter.strategy();
        let stream = match self.adapter.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                let err = StartError::new(strategy, e);
                warn!("Live sync failed to start: {} ({})", err, err.source);
                self.state.send_replace(SyncState::Idle);
                return Err(err);
            }
        };

        let mut active = self.lock_active();
        if self.state() != SyncState::Starting {
            drop(active);
            stream.stop();
            self.state.send_replace(SyncState::Idle);
            info!("Live sync cancelled during start");
            return Ok(false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cycle = self.runtime.spawn(cycle_loop(
            self.context.clone(),
            stream.clone(),
            self.timing,
        ));
        let watcher = self
            .runtime
            .spawn(watch_end(Arc::downgrade(self), stream.clone(), id));

        info!(
            session = id,
            stream = %stream.label(),
            warmup_ms = self.timing.warmup.as_millis() as u64,
            interval_secs = self.timing.interval.as_secs(),
            "Live sync started"
        );
        *active = Some(ActiveSession {
            id,
            stream,
            cycle,
            watcher,
        });
        self.state.send_replace(SyncState::Live);
        Ok(true)
    }

    /// Leave live mode: stop every track and cancel the timers.
    /// Returns false if there was nothing to stop.
    pub fn stop(&self) -> bool {
        self.stop_session(None)
    }

    /// Stop only if `id` is still the active session
    fn stop_session(&self, id: Option<u64>) -> bool {
        let mut active = self.lock_active();
        if let (Some(id), Some(current)) = (id, active.as_ref()) {
            if current.id != id {
                return false;
            }
        }

        let previous = self.state.send_if_modified(|s| match s {
            SyncState::Live | SyncState::Starting => {
                *s = SyncState::Stopping;
                true
            }
            _ => false,
        });
        if !previous {
            return false;
        }

        if let Some(session) = active.take() {
            session.cycle.abort();
            session.watcher.abort();
            session.stream.stop();
            self.context.frames.send_replace(None);
            self.state.send_replace(SyncState::Idle);
            info!(session = session.id, "Live sync stopped");
        }
        // Still starting: `start` finishes the transition once acquire returns
        true
    }

    /// Resolves the next time the controller reaches `state`
    pub async fn wait_for_state(&self, state: SyncState) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == state).await;
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = active {
            session.cycle.abort();
            session.watcher.abort();
            session.stream.stop();
        }
    }
}

/// Warm-up, then a fixed-period ticker measured from the session start.
/// Each cycle runs detached so a slow request never delays the schedule
/// and stopping never cancels a request already in flight.
async fn cycle_loop(context: Arc<CycleContext>, stream: StreamHandle, timing: SyncTiming) {
    let started = Instant::now();

    tokio::time::sleep(timing.warmup).await;
    tokio::spawn(run_cycle(context.clone(), stream.clone()));

    let mut ticker = interval_at(started + timing.interval, timing.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tokio::spawn(run_cycle(context.clone(), stream.clone()));
    }
}

/// One sample → recognize → merge pass. Failures are logged, never raised.
async fn run_cycle(context: Arc<CycleContext>, stream: StreamHandle) {
    let busy = context.activity.scan();
    let payload = match context.sampler.capture(&stream).await {
        Ok(payload) => payload,
        Err(CaptureError::NoFrameAvailable) => {
            debug!("No frame available, skipping cycle");
            return;
        }
        Err(e) => {
            warn!("Frame capture failed: {}", e);
            return;
        }
    };

    // Checked under the frame lock; stop leaves Live before it clears the preview
    context.frames.send_if_modified(|frame| {
        if *context.state.borrow() == SyncState::Live {
            *frame = Some(payload.clone());
            true
        } else {
            false
        }
    });

    let result = context.model.recognize(&payload).await;
    drop(busy);
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            warn!("Auto recognition failed: {}", e);
            return;
        }
    };

    let commit = context.store.merge(&result, MergePolicy::RespectSentinels);
    debug!(
        changed = commit.changed,
        trigger = commit.trigger_changed,
        "Recognition cycle merged"
    );

    let live = *context.state.borrow() == SyncState::Live;
    context.queue.observe(&commit, live);
}

async fn watch_end(controller: Weak<SyncController>, stream: StreamHandle, id: u64) {
    stream.ended().await;
    if let Some(controller) = controller.upgrade() {
        info!(session = id, "Capture ended externally");
        controller.stop_session(Some(id));
    }
}
