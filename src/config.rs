//! Service configuration.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `~/.marionette/config.toml` (user)
//! 3. `/etc/marionette/config.toml` (system)
//! 4. built-in defaults
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.marionette/secrets.toml` (user, must be 0600)
//! 2. `/etc/marionette/secrets.toml` (system, must be 0600)
//! 3. `YOUTUBE_API_KEY` / `GEMINI_API_KEY` environment variables

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::CacheConfig;
use crate::providers::RetryConfig;
use crate::{MarionetteError, Result};

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Filesystem layout.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Root for `config/`, `data/`, `videos/` and `logs/`.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marionette")
}

/// Sizes and lifetimes of the two caches.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_response_max_entries")]
    pub response_max_entries: usize,
    #[serde(default = "default_response_ttl")]
    pub response_ttl_secs: u64,
    #[serde(default = "default_audio_max_entries")]
    pub audio_max_entries: usize,
    #[serde(default = "default_audio_ttl")]
    pub audio_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            response_max_entries: default_response_max_entries(),
            response_ttl_secs: default_response_ttl(),
            audio_max_entries: default_audio_max_entries(),
            audio_ttl_secs: default_audio_ttl(),
        }
    }
}

fn default_response_max_entries() -> usize {
    100
}

fn default_response_ttl() -> u64 {
    3600
}

fn default_audio_max_entries() -> usize {
    50
}

fn default_audio_ttl() -> u64 {
    7200
}

impl CacheSettings {
    pub fn responses(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.response_max_entries)
            .ttl(Duration::from_secs(self.response_ttl_secs))
    }

    pub fn audio(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.audio_max_entries)
            .ttl(Duration::from_secs(self.audio_ttl_secs))
    }
}

/// Live chat polling.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Broadcast to read chat from. Without one, no comments arrive.
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            video_id: None,
            poll_interval_secs: default_poll_interval(),
            min_request_interval_ms: default_min_request_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_min_request_interval() -> u64 {
    1000
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

/// Reply generator.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Override for the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_model(),
        }
    }
}

fn default_model() -> String {
    crate::providers::gemini::DEFAULT_MODEL.to_string()
}

/// Speech synthesis engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_url")]
    pub base_url: String,
    #[serde(default = "default_speaker")]
    pub speaker: u32,
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: default_speech_url(),
            speaker: default_speaker(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

fn default_speech_url() -> String {
    crate::providers::aivis::DEFAULT_BASE_URL.to_string()
}

fn default_speaker() -> u32 {
    1
}

fn default_speech_timeout() -> u64 {
    30
}

/// Retry policy for the generator and synthesizer.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
    }
}

impl Config {
    /// Load configuration from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    MarionetteError::Configuration(format!(
                        "Failed to read config file {path:?}: {e}"
                    ))
                })?;
                let config = Self::from_toml(&content).map_err(|e| {
                    MarionetteError::Configuration(format!(
                        "Failed to parse config file {path:?}: {e}"
                    ))
                })?;
                info!(path = %path.display(), "configuration loaded");
                Ok(config)
            }
            None => {
                warn!("no config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MarionetteError::Configuration(e.to_string()))
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MarionetteError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".marionette").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/marionette/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    pub fn base_dir(&self) -> &Path {
        &self.paths.base_dir
    }

    pub fn config_dir(&self) -> PathBuf {
        self.paths.base_dir.join("config")
    }

    /// Where cache snapshots live.
    pub fn data_dir(&self) -> PathBuf {
        self.paths.base_dir.join("data")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.paths.base_dir.join("videos")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.paths.base_dir.join("logs")
    }

    pub fn video_catalog_path(&self) -> PathBuf {
        self.config_dir().join("video_config.json")
    }

    pub fn character_config_path(&self) -> PathBuf {
        self.config_dir().join("character_config.json")
    }

    /// Create `config/`, `data/`, `videos/` and `logs/` under the base dir.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.config_dir(),
            self.data_dir(),
            self.videos_dir(),
            self.logs_dir(),
        ] {
            fs::create_dir_all(&dir)?;
            debug!(path = %dir.display(), "directory ready");
        }
        Ok(())
    }
}

/// API keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub youtube: Option<ApiKeySecret>,
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Service name → environment variable name mapping.
const SERVICE_ENV_VARS: &[(&str, &str)] = &[
    ("youtube", "YOUTUBE_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
];

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".marionette").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/marionette/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a specific secrets file. Its permissions are checked first.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            MarionetteError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MarionetteError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            MarionetteError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(MarionetteError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a service, falling back to its environment variable.
    pub fn api_key(&self, service: &str) -> Option<String> {
        let from_file = match service {
            "youtube" => self.youtube.as_ref(),
            "gemini" => self.gemini.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            SERVICE_ENV_VARS
                .iter()
                .find(|(name, _)| *name == service)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
        })
    }
}
