use tokio::sync::watch;
use tracing::debug;
use wr_state::{MatchupState, MergePolicy, RecognitionResult, Role};

/// Outcome of one write to the store
#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub changed: bool,
    /// Hero fields or item count moved, so a live session should re-analyze
    pub trigger_changed: bool,
    pub snapshot: MatchupState,
}

/// Authoritative matchup shared by manual edits and recognition merges.
///
/// Writes go through [`watch::Sender::send_if_modified`], so subscribers
/// only wake when a value actually changed.
pub struct MatchupStore {
    tx: watch::Sender<MatchupState>,
}

impl Default for MatchupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchupStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(MatchupState::new());
        Self { tx }
    }

    pub fn snapshot(&self) -> MatchupState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MatchupState> {
        self.tx.subscribe()
    }

    fn update<F>(&self, f: F) -> Commit
    where
        F: FnOnce(&mut MatchupState) -> bool,
    {
        let mut commit = Commit::default();
        self.tx.send_if_modified(|state| {
            let before = state.trigger_key();
            commit.changed = f(state);
            commit.trigger_changed = commit.changed && state.trigger_key() != before;
            commit.snapshot = state.clone();
            commit.changed
        });
        commit
    }

    pub fn set_my_hero(&self, name: &str) -> Commit {
        let name = name.trim();
        self.update(|s| replace(&mut s.my_hero, name))
    }

    pub fn set_enemy_hero(&self, name: &str) -> Commit {
        let name = name.trim();
        self.update(|s| replace(&mut s.enemy_hero, name))
    }

    pub fn set_role(&self, role: Role) -> Commit {
        self.update(|s| {
            let changed = s.my_role != role;
            s.my_role = role;
            changed
        })
    }

    pub fn add_enemy_item(&self, text: &str) -> Commit {
        self.update(|s| s.add_enemy_item(text))
    }

    pub fn remove_enemy_item(&self, index: usize) -> Commit {
        self.update(|s| {
            let removed = s.remove_enemy_item(index);
            if let Some(item) = &removed {
                debug!("Removed enemy item {} at {}", item, index);
            }
            removed.is_some()
        })
    }

    pub fn merge(&self, result: &RecognitionResult, policy: MergePolicy) -> Commit {
        self.update(|s| s.merge_recognition(result, policy))
    }

    /// Back to an empty matchup
    pub fn reset(&self) -> Commit {
        self.update(|s| {
            let changed = *s != MatchupState::default();
            *s = MatchupState::default();
            changed
        })
    }
}

fn replace(field: &mut String, value: &str) -> bool {
    if field == value {
        return false;
    }
    *field = value.to_string();
    true
}
