//! AIVIS speech synthesizer (VOICEVOX-compatible engine API).
//!
//! Synthesis is two requests: `POST /audio_query` turns text into a query
//! document, then `POST /synthesis` renders that document to WAV bytes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::traits::SpeechSynthesizer;
use crate::error::status_error;
use crate::types::AudioClip;
use crate::{MarionetteError, Result};

/// Default engine address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:50021";

/// Client for an AIVIS engine.
#[derive(Clone)]
pub struct AivisClient {
    http: Client,
    base_url: String,
    speaker: u32,
}

impl AivisClient {
    /// Create a client for `base_url` with speaker 1 and a 30 s timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, 1, Duration::from_secs(30))
    }

    pub fn with_options(
        base_url: impl Into<String>,
        speaker: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            speaker,
        })
    }

    pub fn speaker(&self) -> u32 {
        self.speaker
    }

    async fn audio_query(&self, text: &str) -> Result<serde_json::Value> {
        let speaker = self.speaker.to_string();
        let response = self
            .http
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        status_error(&response, "aivis audio_query")?;

        response
            .json()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))
    }
}

#[async_trait]
impl SpeechSynthesizer for AivisClient {
    fn name(&self) -> &str {
        "aivis"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let query = self.audio_query(text).await?;

        let response = self
            .http
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", self.speaker)])
            .json(&query)
            .send()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        status_error(&response, "aivis synthesis")?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;
        if bytes.is_empty() {
            return Err(MarionetteError::EmptyResponse);
        }
        debug!(bytes = bytes.len(), speaker = self.speaker, "speech synthesized");
        Ok(AudioClip::new(bytes.to_vec()))
    }
}
