//! Application state handed to the presentation layer.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use wr_advisor::{CoachModel, GeminiClient};
use wr_capture::{CaptureSourceAdapter, CaptureStrategy, FrameSampler, Platform};
use wr_data::GameData;
use wr_state::{ImagePayload, MatchupState, MergePolicy, Role};

use crate::activity::{Activity, ActivityState};
use crate::analysis::{AnalysisQueue, AnalysisStatus, Ticket};
use crate::config::TacticianConfig;
use crate::pipeline::{StartError, SyncController, SyncState, SyncTiming};
use crate::store::{Commit, MatchupStore};

/// Message shown when a manual screenshot could not be recognized
pub const RECOGNITION_FAILED: &str = "识别失败";

/// Everything the UI renders, in one serializable snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub matchup: MatchupState,
    pub sync_state: SyncState,
    pub capture_strategy: CaptureStrategy,
    pub stream_label: Option<String>,
    /// `scanning` and `uploading`
    #[serde(flatten)]
    pub activity: ActivityState,
    /// Last frame a live cycle sampled
    pub live_frame: Option<ImagePayload>,
    pub analysis: AnalysisStatus,
    pub error: Option<String>,
    pub hero_suggestions: Vec<String>,
    pub roles: Vec<&'static str>,
}

/// Owns the store, the analysis queue, the sync controller and the model.
/// Created once at startup; every user operation goes through it.
pub struct Session {
    store: Arc<MatchupStore>,
    queue: Arc<AnalysisQueue>,
    controller: Arc<SyncController>,
    model: Arc<dyn CoachModel>,
    sampler: FrameSampler,
    upload_policy: MergePolicy,
    activity: Arc<Activity>,
    error: watch::Sender<Option<String>>,
    game_data: GameData,
}

impl Session {
    /// Must be called from inside a tokio runtime
    pub fn new(
        config: &TacticianConfig,
        model: Arc<dyn CoachModel>,
        adapter: CaptureSourceAdapter,
        game_data: GameData,
    ) -> Self {
        let sampler = FrameSampler::new(config.sync.jpeg_quality);
        let store = Arc::new(MatchupStore::new());
        let queue = Arc::new(AnalysisQueue::spawn(model.clone()));
        let activity = Activity::new();
        let controller = SyncController::new(
            adapter,
            sampler,
            SyncTiming::from(&config.sync),
            model.clone(),
            store.clone(),
            queue.clone(),
            activity.clone(),
        );
        let (error, _) = watch::channel(None);

        Self {
            store,
            queue,
            controller,
            model,
            sampler,
            upload_policy: config.recognition.upload_policy,
            activity,
            error,
            game_data,
        }
    }

    /// Production wiring: Gemini client, native capture backends, hero data
    pub fn from_config(config: &TacticianConfig) -> Result<Self> {
        let model = GeminiClient::new(config.gemini_config())
            .context("Set GEMINI_API_KEY (or API_KEY) to use recognition and analysis")?;

        let platform = Platform::from_hint(config.capture.platform);
        let adapter = CaptureSourceAdapter::native(platform)
            .with_window_title(config.capture.window_title.clone());

        let data_dir = config.data_dir();
        let game_data = GameData::load(&data_dir)
            .with_context(|| format!("Failed to load hero data from {}", data_dir.display()))?;

        info!(
            model = model.model(),
            ?platform,
            heroes = game_data.len(),
            "Session ready"
        );
        Ok(Self::new(config, Arc::new(model), adapter, game_data))
    }

    pub fn matchup(&self) -> MatchupState {
        self.store.snapshot()
    }

    pub fn sync_state(&self) -> SyncState {
        self.controller.state()
    }

    pub fn analysis(&self) -> AnalysisStatus {
        self.queue.status()
    }

    pub fn activity(&self) -> ActivityState {
        self.activity.state()
    }

    pub fn is_uploading(&self) -> bool {
        self.activity.state().uploading
    }

    pub fn is_scanning(&self) -> bool {
        self.activity.state().scanning
    }

    pub fn subscribe_matchup(&self) -> watch::Receiver<MatchupState> {
        self.store.subscribe()
    }

    pub fn subscribe_sync(&self) -> watch::Receiver<SyncState> {
        self.controller.subscribe()
    }

    pub fn subscribe_analysis(&self) -> watch::Receiver<AnalysisStatus> {
        self.queue.subscribe()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    pub fn subscribe_activity(&self) -> watch::Receiver<ActivityState> {
        self.activity.subscribe()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<ImagePayload>> {
        self.controller.subscribe_frames()
    }

    fn after_commit(&self, commit: &Commit) -> Option<Ticket> {
        self.queue.observe(commit, self.controller.is_live())
    }

    pub fn set_my_hero(&self, name: &str) -> MatchupState {
        let commit = self.store.set_my_hero(name);
        self.after_commit(&commit);
        commit.snapshot
    }

    pub fn set_enemy_hero(&self, name: &str) -> MatchupState {
        let commit = self.store.set_enemy_hero(name);
        self.after_commit(&commit);
        commit.snapshot
    }

    pub fn set_role(&self, role: Role) -> MatchupState {
        let commit = self.store.set_role(role);
        self.after_commit(&commit);
        commit.snapshot
    }

    pub fn add_enemy_item(&self, text: &str) -> MatchupState {
        let commit = self.store.add_enemy_item(text);
        self.after_commit(&commit);
        commit.snapshot
    }

    pub fn remove_enemy_item(&self, index: usize) -> MatchupState {
        let commit = self.store.remove_enemy_item(index);
        self.after_commit(&commit);
        commit.snapshot
    }

    /// Manual "analyze" button. Ignored until both heroes are set.
    pub fn analyze(&self) -> Option<Ticket> {
        self.set_error(None);
        self.queue.enqueue(self.store.snapshot())
    }

    /// Wait for a ticket returned by [`Self::analyze`] or queued by a trigger
    pub async fn analysis_settled(&self, ticket: Ticket) -> AnalysisStatus {
        self.queue.settled(ticket).await
    }

    pub async fn start_live(&self) -> Result<bool, StartError> {
        match self.controller.start().await {
            Ok(started) => {
                if started {
                    self.set_error(None);
                }
                Ok(started)
            }
            Err(e) => {
                self.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn stop_live(&self) -> bool {
        self.controller.stop()
    }

    /// Recognize an uploaded screenshot (any image format) and merge it
    pub async fn recognize_upload(&self, bytes: &[u8]) -> Result<MatchupState> {
        let payload = self.sampler.from_upload(bytes);
        self.recognize_payload(payload.map_err(Into::into)).await
    }

    /// Same as [`Self::recognize_upload`] for a `data:` URL from the page
    pub async fn recognize_data_url(&self, data_url: &str) -> Result<MatchupState> {
        let payload = self.sampler.from_data_url(data_url);
        self.recognize_payload(payload.map_err(Into::into)).await
    }

    async fn recognize_payload(&self, payload: Result<ImagePayload>) -> Result<MatchupState> {
        self.set_error(None);
        let busy = self.activity.upload();
        let outcome = match payload {
            Ok(payload) => self
                .model
                .recognize(&payload)
                .await
                .context("Screenshot recognition failed"),
            Err(e) => Err(e.context("Unreadable screenshot")),
        };
        drop(busy);

        match outcome {
            Ok(result) => {
                let commit = self.store.merge(&result, self.upload_policy);
                self.after_commit(&commit);
                info!(changed = commit.changed, "Screenshot recognized");
                Ok(commit.snapshot)
            }
            Err(e) => {
                warn!("{:#}", e);
                self.set_error(Some(RECOGNITION_FAILED.to_string()));
                Err(e)
            }
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.set_error(None);
        self.queue.clear_error();
    }

    fn set_error(&self, message: Option<String>) {
        self.error.send_if_modified(|current| {
            if *current == message {
                false
            } else {
                *current = message;
                true
            }
        });
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            matchup: self.store.snapshot(),
            sync_state: self.controller.state(),
            capture_strategy: self.controller.strategy(),
            stream_label: self.controller.stream_label(),
            activity: self.activity.state(),
            live_frame: self.controller.latest_frame(),
            analysis: self.queue.status(),
            error: self.error(),
            hero_suggestions: self.game_data.suggestions(),
            roles: Role::ALL.iter().map(Role::label).collect(),
        }
    }

    /// Release the capture device. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.controller.stop() {
            info!("Live sync stopped on shutdown");
        }
    }
}
