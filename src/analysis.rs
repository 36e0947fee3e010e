use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wr_advisor::CoachModel;
use wr_state::{AnalysisResult, MatchupState};

use crate::store::Commit;

/// Banner shown when an analysis request fails
pub const ANALYSIS_FAILED: &str = "分析失败，请检查网络";

pub type Ticket = u64;

/// What the UI shows about analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatus {
    pub loading: bool,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    /// Requests that actually went out
    pub completed: u64,
    /// Highest ticket that has either run or been superseded
    pub settled: Ticket,
}

struct Job {
    ticket: Ticket,
    matchup: MatchupState,
}

/// Serialized analysis requests.
///
/// A single worker runs at most one request at a time. Jobs queued while it is
/// busy are coalesced: only the newest one runs next.
pub struct AnalysisQueue {
    jobs: mpsc::UnboundedSender<Job>,
    /// Held across allocation and send so tickets reach the worker in order
    next_ticket: Mutex<Ticket>,
    status: watch::Sender<AnalysisStatus>,
    worker: JoinHandle<()>,
}

impl AnalysisQueue {
    /// Start the worker on the current tokio runtime
    pub fn spawn(model: Arc<dyn CoachModel>) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(AnalysisStatus::default());
        let worker = tokio::spawn(worker_loop(rx, model, status.clone()));
        Self {
            jobs,
            next_ticket: Mutex::new(1),
            status,
            worker,
        }
    }

    /// Queue an analysis of `matchup`. Ignored unless both heroes are set.
    pub fn enqueue(&self, matchup: MatchupState) -> Option<Ticket> {
        if !matchup.is_ready_for_analysis() {
            debug!("Analysis skipped: heroes not set");
            return None;
        }

        let mut next = self.next_ticket.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = *next;
        self.status.send_if_modified(|s| !std::mem::replace(&mut s.loading, true));
        if self.jobs.send(Job { ticket, matchup }).is_err() {
            warn!("Analysis worker is gone, dropping ticket {}", ticket);
            return None;
        }
        *next += 1;
        drop(next);
        debug!("Queued analysis ticket {}", ticket);
        Some(ticket)
    }

    /// Re-analyze after a store write, if the session is live and the write
    /// touched a hero or the item count
    pub fn observe(&self, commit: &Commit, live: bool) -> Option<Ticket> {
        if live && commit.trigger_changed {
            self.enqueue(commit.snapshot.clone())
        } else {
            None
        }
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisStatus> {
        self.status.subscribe()
    }

    /// Wait until `ticket` has run or been superseded by a newer one
    pub async fn settled(&self, ticket: Ticket) -> AnalysisStatus {
        let mut rx = self.status.subscribe();
        let status = match rx.wait_for(|s| s.settled >= ticket).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        status
    }

    pub fn clear_error(&self) {
        self.status.send_if_modified(|s| s.error.take().is_some());
    }
}

impl Drop for AnalysisQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<Job>,
    model: Arc<dyn CoachModel>,
    status: watch::Sender<AnalysisStatus>,
) {
    while let Some(mut job) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            debug!("Analysis ticket {} superseded by {}", job.ticket, newer.ticket);
            job = newer;
        }

        status.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let outcome = model.analyze(&job.matchup).await;
        let more = !rx.is_empty();

        status.send_modify(|s| {
            s.completed += 1;
            s.settled = s.settled.max(job.ticket);
            s.loading = more;
            match outcome {
                Ok(result) => {
                    info!(
                        ticket = job.ticket,
                        items = result.recommended_items.len(),
                        "Analysis complete"
                    );
                    s.result = Some(result);
                    s.error = None;
                }
                Err(e) => {
                    warn!(ticket = job.ticket, "Analysis failed: {}", e);
                    s.error = Some(ANALYSIS_FAILED.to_string());
                }
            }
        });
    }
}
