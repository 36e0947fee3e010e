//! Busy indicators the page shows while work is in flight.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// What is running right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityState {
    /// A live cycle is sampling or waiting on recognition
    pub scanning: bool,
    /// A manual screenshot is being recognized
    pub uploading: bool,
}

#[derive(Debug, Clone, Copy)]
enum Work {
    Scan,
    Upload,
}

#[derive(Debug, Default)]
struct Counts {
    scans: usize,
    uploads: usize,
}

/// Counts overlapping scans and uploads and publishes whether any are running
#[derive(Debug)]
pub struct Activity {
    counts: Mutex<Counts>,
    state: watch::Sender<ActivityState>,
}

/// Marks work as running until dropped
#[must_use = "the work counts as finished once the guard is dropped"]
pub struct Busy {
    activity: Arc<Activity>,
    work: Work,
}

impl Drop for Busy {
    fn drop(&mut self) {
        self.activity.adjust(self.work, false);
    }
}

impl Activity {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ActivityState::default());
        Arc::new(Self {
            counts: Mutex::new(Counts::default()),
            state,
        })
    }

    pub fn scan(self: &Arc<Self>) -> Busy {
        self.begin(Work::Scan)
    }

    pub fn upload(self: &Arc<Self>) -> Busy {
        self.begin(Work::Upload)
    }

    fn begin(self: &Arc<Self>, work: Work) -> Busy {
        self.adjust(work, true);
        Busy {
            activity: self.clone(),
            work,
        }
    }

    fn adjust(&self, work: Work, begin: bool) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = match work {
            Work::Scan => &mut counts.scans,
            Work::Upload => &mut counts.uploads,
        };
        *count = if begin {
            *count + 1
        } else {
            count.saturating_sub(1)
        };

        // Published under the lock so concurrent guards cannot reorder updates
        let next = ActivityState {
            scanning: counts.scans > 0,
            uploading: counts.uploads > 0,
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn state(&self) -> ActivityState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActivityState> {
        self.state.subscribe()
    }
}
