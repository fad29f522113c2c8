//! YouTube Data API v3 live chat source.
//!
//! The live chat id is resolved from the broadcast's video id on first
//! poll. Later polls continue from the last `nextPageToken`, so each batch
//! only carries messages that arrived since the previous one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::traits::ChatSource;
use crate::error::status_error;
use crate::types::ChatMessage;
use crate::{MarionetteError, Result};

/// Default base URL for the YouTube Data API.
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Default spacing between consecutive API requests.
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct ChatCursor {
    live_chat_id: Option<String>,
    next_page_token: Option<String>,
    last_request: Option<Instant>,
}

/// Client for one broadcast's live chat.
pub struct YouTubeChatClient {
    api_key: String,
    video_id: Option<String>,
    http: Client,
    base_url: String,
    min_request_interval: Duration,
    cursor: Mutex<ChatCursor>,
}

impl YouTubeChatClient {
    /// Create a client for the broadcast `video_id`. With no video id,
    /// polls return empty batches.
    pub fn new(api_key: impl Into<String>, video_id: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, video_id, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        video_id: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            video_id,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            cursor: Mutex::new(ChatCursor::default()),
        })
    }

    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    /// Currently resolved live chat id.
    pub async fn live_chat_id(&self) -> Option<String> {
        self.cursor.lock().await.live_chat_id.clone()
    }

    /// Look up the active live chat id for `video_id`.
    ///
    /// Returns `Ok(None)` when the video has no active live chat.
    pub async fn resolve_live_chat_id(&self, video_id: &str) -> Result<Option<String>> {
        let mut cursor = self.cursor.lock().await;
        self.fetch_live_chat_id(&mut cursor, video_id).await
    }

    async fn fetch_live_chat_id(
        &self,
        cursor: &mut ChatCursor,
        video_id: &str,
    ) -> Result<Option<String>> {
        self.throttle(cursor).await;
        let response = self
            .http
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "liveStreamingDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        status_error(&response, "youtube videos")?;

        let body: VideosResponse = response
            .json()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        let chat_id = body
            .items
            .into_iter()
            .next()
            .and_then(|item| item.live_streaming_details)
            .and_then(|details| details.active_live_chat_id);

        match &chat_id {
            Some(id) => info!(video_id, live_chat_id = %id, "live chat resolved"),
            None => warn!(video_id, "video has no active live chat"),
        }
        cursor.live_chat_id = chat_id.clone();
        cursor.next_page_token = None;
        Ok(chat_id)
    }

    /// Sleep until the minimum request interval has passed.
    async fn throttle(&self, cursor: &mut ChatCursor) {
        if let Some(last) = cursor.last_request {
            let since = last.elapsed();
            if since < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - since).await;
            }
        }
        cursor.last_request = Some(Instant::now());
    }
}

#[async_trait]
impl ChatSource for YouTubeChatClient {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn poll(&self) -> Result<Vec<ChatMessage>> {
        let mut cursor = self.cursor.lock().await;

        let chat_id = match cursor.live_chat_id.clone() {
            Some(id) => id,
            None => {
                let Some(video_id) = self.video_id.as_deref() else {
                    return Ok(Vec::new());
                };
                match self.fetch_live_chat_id(&mut cursor, video_id).await? {
                    Some(id) => id,
                    None => return Ok(Vec::new()),
                }
            }
        };

        self.throttle(&mut cursor).await;
        let mut query = vec![
            ("liveChatId", chat_id.as_str()),
            ("part", "snippet,authorDetails"),
            ("key", self.api_key.as_str()),
        ];
        if let Some(token) = cursor.next_page_token.as_deref() {
            query.push(("pageToken", token));
        }

        let response = self
            .http
            .get(format!("{}/liveChat/messages", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        status_error(&response, "youtube liveChatMessages")?;

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| MarionetteError::Http(e.to_string()))?;

        cursor.next_page_token = body.next_page_token;
        let messages: Vec<ChatMessage> = body
            .items
            .into_iter()
            .filter_map(|item| {
                let message = item.snippet.display_message?;
                let author = item.author_details.unwrap_or_default();
                Some(ChatMessage::new(
                    message,
                    author.display_name.unwrap_or_else(|| "unknown".to_string()),
                    author.channel_id.unwrap_or_default(),
                ))
            })
            .collect();
        debug!(count = messages.len(), "chat messages polled");
        Ok(messages)
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    active_live_chat_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<MessageItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageItem {
    #[serde(default)]
    snippet: Snippet,
    author_details: Option<AuthorDetails>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    display_message: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AuthorDetails {
    display_name: Option<String>,
    channel_id: Option<String>,
}
