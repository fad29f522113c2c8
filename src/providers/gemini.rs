//! Gemini (Generative Language API) reply generator.
//!
//! See: <https://ai.google.dev/api/generate-content>

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::traits::ReplyGenerator;
use crate::error::status_error;
use crate::types::ReplyPrompt;
use crate::{MarionetteError, Result};

/// Default base URL for the Generative Language API.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model.
pub const DEFAULT_MODEL: &str = "gemini-pro";

/// Character persona prepended to every prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub prompt: String,
}

impl Persona {
    /// Load `character_config.json`. A missing or corrupt file yields an
    /// empty persona.
    pub fn load(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(MarionetteError::from)
            .and_then(|s| serde_json::from_str::<Persona>(&s).map_err(MarionetteError::from));
        match parsed {
            Ok(persona) => persona,
            Err(e) => {
                error!(path = %path.display(), error = %e, "error loading character config");
                Self::default()
            }
        }
    }
}

/// Client for Gemini `generateContent`.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    persona: Persona,
    http: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            persona: Persona::default(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    /// Full prompt text sent to the model.
    pub fn build_context(&self, prompt: &ReplyPrompt) -> String {
        let mut context = String::new();
        if !self.persona.prompt.is_empty() {
            context.push_str(&self.persona.prompt);
            context.push_str("\n\n");
        }
        context.push_str("Current situation:\n");
        context.push_str(&format!("Username: {}\n", prompt.username));
        if prompt.first_time {
            context.push_str("This is their first comment.\n");
        }
        if prompt.first_today {
            context.push_str("This is their first comment today.\n");
        }
        context.push_str(&format!("\nViewer comment: {}\n", prompt.message));
        context
    }
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &ReplyPrompt) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let context = self.build_context(prompt);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateRequest {
                contents: vec![Content {
                    role: "user",
                    parts: vec![Part { text: &context }],
                }],
            })
            .send()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        status_error(&response, "gemini")?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(MarionetteError::EmptyResponse);
        }
        debug!(model = %self.model, chars = text.chars().count(), "reply generated");
        Ok(text.to_string())
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
