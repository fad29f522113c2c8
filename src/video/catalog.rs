//! Video catalog configuration (`video_config.json`).
//!
//! ```json
//! {
//!   "video_files": {
//!     "idle": { "00": "idle_00.mp4", "01": "idle_01.mp4" },
//!     "talking": ["talk_short.mp4", "talk_medium.mp4", "talk_long.mp4"]
//!   },
//!   "idle_pattern": [
//!     { "video": "00", "repeat": 3 },
//!     { "video": "01", "repeat": 1 }
//!   ]
//! }
//! ```
//!
//! Loaded once before the scheduler starts. A missing, unparseable or
//! empty catalog is fatal.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{MarionetteError, Result};

/// Key used for the fallback idle clip when the catalog names none.
const DEFAULT_FALLBACK_KEY: &str = "00";

/// The full catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCatalog {
    pub video_files: VideoFiles,
    pub idle_pattern: Vec<IdlePatternStep>,
    /// Idle key shown when stepping fails. Defaults to `"00"`, then the smallest key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_idle: Option<String>,
}

/// Filenames relative to the videos directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFiles {
    pub idle: BTreeMap<String, String>,
    /// Short, medium and long reply clips, in that order.
    pub talking: Vec<String>,
}

/// One step of the repeating idle pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdlePatternStep {
    #[serde(rename = "video")]
    pub video_key: String,
    #[serde(rename = "repeat", default = "default_repeat")]
    pub repeat_count: u32,
}

fn default_repeat() -> u32 {
    1
}

impl VideoCatalog {
    /// Read and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MarionetteError::Configuration(format!("Video config not found at {path:?}: {e}"))
        })?;
        Self::from_json(&content).map_err(|e| {
            MarionetteError::Configuration(format!("Invalid video config {path:?}: {e}"))
        })
    }

    /// Parse and validate catalog JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        if self.video_files.idle.is_empty() {
            return Err(MarionetteError::Configuration(
                "video_files.idle must name at least one clip".to_string(),
            ));
        }
        if self.video_files.talking.is_empty() {
            return Err(MarionetteError::Configuration(
                "video_files.talking must name at least one clip".to_string(),
            ));
        }
        if self.idle_pattern.is_empty() {
            return Err(MarionetteError::Configuration(
                "idle_pattern must have at least one step".to_string(),
            ));
        }
        if self.fallback_idle().is_none() {
            return Err(MarionetteError::Configuration(format!(
                "fallback_idle {:?} is not an idle key",
                self.fallback_idle
            )));
        }
        if self.video_files.talking.len() < 3 {
            warn!(
                configured = self.video_files.talking.len(),
                "fewer than three talking clips; missing tiers fall back to the first"
            );
        }
        for step in &self.idle_pattern {
            if !self.video_files.idle.contains_key(&step.video_key) {
                warn!(key = %step.video_key, "idle pattern references unknown idle key");
            }
        }
        Ok(())
    }

    /// The fallback idle clip as `(key, filename)`.
    pub fn fallback_idle(&self) -> Option<(&str, &str)> {
        let idle = &self.video_files.idle;
        let entry = match self.fallback_idle.as_deref() {
            Some(key) => idle.get_key_value(key),
            None => idle
                .get_key_value(DEFAULT_FALLBACK_KEY)
                .or_else(|| idle.iter().next()),
        };
        entry.map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Every filename the catalog references, idle first, deduplicated.
    pub fn filenames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let all = self
            .video_files
            .idle
            .values()
            .chain(self.video_files.talking.iter());
        for name in all {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}
