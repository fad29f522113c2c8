//! Live chat messages and the prompt built from them.

use serde::{Deserialize, Serialize};

/// One viewer comment from the live chat feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    pub username: String,
    pub user_id: String,
}

impl ChatMessage {
    pub fn new(
        message: impl Into<String>,
        username: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            username: username.into(),
            user_id: user_id.into(),
        }
    }
}

/// Input to a [`ReplyGenerator`](crate::providers::ReplyGenerator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPrompt {
    pub message: String,
    pub username: String,
    /// First comment ever seen from this viewer.
    pub first_time: bool,
    /// First comment from this viewer on the current local date.
    pub first_today: bool,
}

impl ReplyPrompt {
    pub fn new(message: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            username: username.into(),
            first_time: false,
            first_today: false,
        }
    }

    pub fn first_time(mut self, yes: bool) -> Self {
        self.first_time = yes;
        self
    }

    pub fn first_today(mut self, yes: bool) -> Self {
        self.first_today = yes;
        self
    }
}
