//! Application configuration.
//!
//! Load order (later wins):
//! 1. Compiled defaults
//! 2. `~/.config/wr-tactician/config.toml`
//! 3. `./wr-tactician.toml`, or an explicit path
//! 4. Environment: `GEMINI_API_KEY` (or `API_KEY`), `WR_TACTICIAN_MODEL`,
//!    `WR_TACTICIAN_CAPTURE`
//!
//! ```toml
//! data_dir = "./data"
//!
//! [gemini]
//! model = "gemini-3-flash-preview"
//! timeout_secs = 60
//!
//! [sync]
//! warmup_ms = 1000
//! interval_secs = 15
//! jpeg_quality = 80
//!
//! [capture]
//! platform = "auto"        # auto | camera | display
//! window_title = "Wild Rift"
//!
//! [recognition]
//! upload_policy = "respect-sentinels"   # or "overwrite"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use wr_advisor::{GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use wr_capture::{PlatformHint, DEFAULT_JPEG_QUALITY};
use wr_state::MergePolicy;

const LOCAL_CONFIG: &str = "wr-tactician.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSection {
    /// Usually supplied through the environment instead
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Delay before the first recognition cycle, so the stream can settle
    pub warmup_ms: u64,
    /// Period of the recurring recognition cycle
    pub interval_secs: u64,
    pub jpeg_quality: u8,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            warmup_ms: 1000,
            interval_secs: 15,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub platform: PlatformHint,
    pub window_title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSection {
    /// How uploaded screenshots are merged into the matchup
    pub upload_policy: MergePolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticianConfig {
    pub data_dir: Option<PathBuf>,
    pub gemini: GeminiSection,
    pub sync: SyncSection,
    pub capture: CaptureSection,
    pub recognition: RecognitionSection,
}

impl TacticianConfig {
    /// Load from the standard locations and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Self::load`], with `config_path` replacing `./wr-tactician.toml`
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in discover_config_files(config_path) {
            tracing::debug!("Loading config from {}", path.display());
            merge_tables(&mut merged, read_table(&path)?);
        }

        let mut config: TacticianConfig =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    path: config_path.map(Path::to_path_buf).unwrap_or_default(),
                    message: e.to_string(),
                })?;

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment values, looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")) {
            self.gemini.api_key = Some(key);
        }
        if let Some(model) = non_empty("WR_TACTICIAN_MODEL") {
            self.gemini.model = model;
        }
        if let Some(platform) = non_empty("WR_TACTICIAN_CAPTURE") {
            self.capture.platform = match platform.trim().to_lowercase().as_str() {
                "auto" => PlatformHint::Auto,
                "camera" => PlatformHint::Camera,
                "display" => PlatformHint::Display,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "WR_TACTICIAN_CAPTURE",
                        value: platform,
                    })
                }
            };
        }
        Ok(())
    }

    /// Settings for the model client. The key may still be missing;
    /// client construction is where that fails.
    pub fn gemini_config(&self) -> GeminiConfig {
        let mut config = GeminiConfig::new(self.gemini.api_key.clone().unwrap_or_default());
        config.model = self.gemini.model.clone();
        config.base_url = self.gemini.base_url.clone();
        config.timeout = Duration::from_secs(self.gemini.timeout_secs.max(1));
        config
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("data"))
    }
}

/// Existing config files in load order
fn discover_config_files(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Some(dirs) = directories::ProjectDirs::from("", "", "wr-tactician") {
        let user = dirs.config_dir().join("config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    match explicit {
        Some(path) => files.push(path.to_path_buf()),
        None => {
            let local = PathBuf::from(LOCAL_CONFIG);
            if local.exists() {
                files.push(local);
            }
        }
    }

    files
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    contents
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Recursive merge; values from `overlay` win
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
