//! Conversation data model and the accumulator that grows assistant messages

pub mod accumulator;
pub mod dedup;

pub use accumulator::MessageAccumulator;
pub use dedup::clean_buffer;

use crate::render::RenderedMarkdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A rendered conversation entry.
///
/// `content` is the source of truth. `rendered` is derived from it and is
/// `None` when the renderer failed, in which case the UI shows plain text.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub rendered: Option<RenderedMarkdown>,
    pub created_at: DateTime<Utc>,
    /// Set once the message can no longer change
    pub frozen: bool,
}

impl ChatMessage {
    pub(crate) fn user(id: String, content: String) -> Self {
        Self {
            id,
            role: MessageRole::User,
            content,
            rendered: None,
            created_at: Utc::now(),
            frozen: true,
        }
    }

    pub(crate) fn assistant(id: String) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            content: String::new(),
            rendered: None,
            created_at: Utc::now(),
            frozen: false,
        }
    }

    /// Text to show when no render tree is available
    pub fn plain_text(&self) -> &str {
        &self.content
    }
}

/// Per-turn lifecycle of the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No turn has produced content yet
    Idle,
    /// Content fragments are arriving for the current assistant message
    Streaming,
    /// The last turn ended normally (or was closed by the caller)
    Finalized,
    /// The last turn ended with an error and its transport is still open;
    /// the partial message is kept
    Failed,
}

impl TurnState {
    pub fn is_streaming(self) -> bool {
        self == TurnState::Streaming
    }
}
