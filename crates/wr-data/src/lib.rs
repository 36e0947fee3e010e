use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Heroes offered as suggestions before any roster file is loaded
pub const COMMON_HEROES: &[&str] = &[
    "亚索", "永恩", "凯特琳", "拉克丝", "李青", "艾希", "伊泽瑞尔", "金克丝", "迦娜", "娜美",
    "墨菲特", "盖伦", "德莱厄斯", "卡兹克", "雷恩加尔", "阿狸", "卡特琳娜", "薇恩", "瑟提", "提莫",
];

/// Damage profile of a hero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeroKind {
    #[serde(rename = "AD")]
    Ad,
    #[serde(rename = "AP")]
    Ap,
    Tank,
    Utility,
}

/// Hero entry from the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroData {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub kind: Option<HeroKind>,
}

impl HeroData {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: None,
            kind: None,
        }
    }
}

/// Raw heroes.json file format
#[derive(Debug, Deserialize)]
struct HeroesFile {
    #[allow(dead_code)]
    version: Option<String>,
    heroes: Vec<HeroData>,
}

/// Hero roster registry
#[derive(Debug, Clone, Default)]
pub struct GameData {
    heroes: Vec<HeroData>,
    by_name: HashMap<String, usize>,
}

impl GameData {
    /// Roster containing only the built-in common heroes
    pub fn builtin() -> Self {
        let mut data = Self::default();
        for name in COMMON_HEROES {
            data.insert(HeroData::named(name));
        }
        data
    }

    /// Load the built-in roster, then extend it with `heroes.json` from the data directory.
    /// Entries in the file replace built-in entries with the same name.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut data = Self::builtin();

        let heroes_path = data_dir.join("heroes.json");
        if heroes_path.exists() {
            let content =
                std::fs::read_to_string(&heroes_path).context("Failed to read heroes.json")?;
            let file: HeroesFile =
                serde_json::from_str(&content).context("Failed to parse heroes.json")?;

            let from_file = data.merge_file(file);

            tracing::info!(
                "Loaded hero roster: {} heroes ({} from file)",
                data.heroes.len(),
                from_file
            );
        } else {
            tracing::debug!(
                "No heroes.json at {}, using built-in roster",
                heroes_path.display()
            );
        }

        Ok(data)
    }

    /// Returns how many file entries were applied, replacements included
    fn merge_file(&mut self, file: HeroesFile) -> usize {
        let mut applied = 0;
        for hero in file.heroes {
            if self.insert(hero) {
                applied += 1;
            }
        }
        applied
    }

    /// Add or replace a hero by trimmed name. Blank names are skipped.
    fn insert(&mut self, hero: HeroData) -> bool {
        let name = hero.name.trim().to_string();
        if name.is_empty() {
            return false;
        }
        let hero = HeroData { name: name.clone(), ..hero };
        match self.by_name.get(&name) {
            Some(&idx) => self.heroes[idx] = hero,
            None => {
                self.by_name.insert(name, self.heroes.len());
                self.heroes.push(hero);
            }
        }
        true
    }

    pub fn find(&self, name: &str) -> Option<&HeroData> {
        self.by_name.get(name.trim()).map(|&idx| &self.heroes[idx])
    }

    pub fn heroes(&self) -> &[HeroData] {
        &self.heroes
    }

    /// Hero names in roster order, for input suggestions
    pub fn suggestions(&self) -> Vec<String> {
        self.heroes.iter().map(|h| h.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.heroes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heroes.is_empty()
    }
}
