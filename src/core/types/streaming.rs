//! Streaming chunk types
//!
//! A stream yields `ChatChunk` values in wire order. Exactly one terminal
//! chunk per stream carries either a finish reason or an in-band error;
//! the channel is closed immediately after it.

use serde::{Deserialize, Serialize};

use super::chat::{FinishReason, Usage};
use super::message::MessageRole;
use super::tools::ToolCallDelta;
use crate::core::providers::ProviderError;

/// Streaming delta content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    /// Role (usually only on the first chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Content fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool call fragments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Streaming choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Delta content
    pub delta: ChatDelta,
    /// Set on the terminal chunk of the choice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One decoded stream chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Upstream chunk id
    #[serde(default)]
    pub id: String,
    /// Model reported by the upstream
    #[serde(default)]
    pub model: String,
    /// Choice deltas
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Usage, when the upstream emits it on the final chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// In-band terminal error; the channel closes right after this chunk
    #[serde(skip)]
    pub error: Option<ProviderError>,
}

impl ChatChunk {
    /// Terminal chunk carrying an in-band error.
    pub fn from_error(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// True when this chunk terminates the stream.
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.choices.iter().any(|c| c.finish_reason.is_some())
    }

    /// Content fragment of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
    }
}
