use serde::{Deserialize, Serialize};
use std::fmt;

/// Hero name the recognition service answers with when it is not confident
pub const UNKNOWN_HERO: &str = "未知";

/// Whether a recognized hero value means "no confident value"
pub fn is_sentinel(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == UNKNOWN_HERO || value.eq_ignore_ascii_case("unknown")
}

/// Lane role the player is queued into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "上路")]
    Top,
    #[serde(rename = "打野")]
    Jungle,
    #[serde(rename = "中路")]
    Mid,
    #[serde(rename = "下路")]
    Bottom,
    #[serde(rename = "辅助")]
    Support,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Top, Role::Jungle, Role::Mid, Role::Bottom, Role::Support];

    /// Display label, also used verbatim in prompts
    pub fn label(&self) -> &'static str {
        match self {
            Self::Top => "上路",
            Self::Jungle => "打野",
            Self::Mid => "中路",
            Self::Bottom => "下路",
            Self::Support => "辅助",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label() == label.trim())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The current matchup, written by manual edits and recognition merges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupState {
    pub my_hero: String,
    pub my_role: Role,
    pub enemy_hero: String,
    pub enemy_items: Vec<String>,
}

/// Fields whose change re-triggers analysis while live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerKey {
    pub my_hero: String,
    pub enemy_hero: String,
    pub item_count: usize,
}

/// How a recognition result is folded into the matchup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Sentinel hero values and empty item lists leave state untouched
    #[default]
    RespectSentinels,
    /// Any non-empty hero value overwrites, and the item list is always replaced
    Overwrite,
}

impl MatchupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_key(&self) -> TriggerKey {
        TriggerKey {
            my_hero: self.my_hero.clone(),
            enemy_hero: self.enemy_hero.clone(),
            item_count: self.enemy_items.len(),
        }
    }

    /// Both heroes are known, so an analysis request makes sense
    pub fn is_ready_for_analysis(&self) -> bool {
        !self.my_hero.trim().is_empty() && !self.enemy_hero.trim().is_empty()
    }

    /// Append a manually entered item. Blank input is ignored.
    pub fn add_enemy_item(&mut self, text: &str) -> bool {
        let item = text.trim();
        if item.is_empty() {
            return false;
        }
        self.enemy_items.push(item.to_string());
        true
    }

    /// Remove the item at `index`, if there is one
    pub fn remove_enemy_item(&mut self, index: usize) -> Option<String> {
        if index < self.enemy_items.len() {
            Some(self.enemy_items.remove(index))
        } else {
            None
        }
    }

    /// Fold a recognition result into the matchup. Returns true if anything changed.
    pub fn merge_recognition(&mut self, result: &RecognitionResult, policy: MergePolicy) -> bool {
        let before = self.clone();

        match policy {
            MergePolicy::RespectSentinels => {
                if !is_sentinel(&result.my_hero) {
                    self.my_hero = result.my_hero.trim().to_string();
                }
                if !is_sentinel(&result.enemy_hero) {
                    self.enemy_hero = result.enemy_hero.trim().to_string();
                }
                if !result.enemy_items.is_empty() {
                    self.enemy_items = result.enemy_items.clone();
                }
            }
            MergePolicy::Overwrite => {
                if !result.my_hero.is_empty() {
                    self.my_hero = result.my_hero.clone();
                }
                if !result.enemy_hero.is_empty() {
                    self.enemy_hero = result.enemy_hero.clone();
                }
                self.enemy_items = result.enemy_items.clone();
            }
        }

        let changed = *self != before;
        if changed {
            tracing::debug!(
                my_hero = %self.my_hero,
                enemy_hero = %self.enemy_hero,
                items = self.enemy_items.len(),
                ?policy,
                "Merged recognition result"
            );
        }
        changed
    }
}

/// What the recognition service read off a screenshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub my_hero: String,
    pub enemy_hero: String,
    pub enemy_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecommendation {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub sequence: String,
    pub description: String,
}

/// Coaching advice for one matchup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub matchup_analysis: String,
    pub recommended_items: Vec<ItemRecommendation>,
    pub combos: Vec<Combo>,
    pub strategy_tips: Vec<String>,
}

/// A compressed still image ready to inline in a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    /// Base64 without any `data:` header
    pub data: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    pub const JPEG: &'static str = "image/jpeg";
}
