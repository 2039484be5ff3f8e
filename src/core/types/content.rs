//! Content part types for multimodal messages

use serde::{Deserialize, Serialize};

/// Content part (multimodal support)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// Text content
    #[serde(rename = "text")]
    Text { text: String },

    /// Image URL
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },

    /// Audio data
    #[serde(rename = "audio")]
    Audio { audio: AudioData },

    /// Tool result (Anthropic content-block shape)
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Id of the `tool_use` block this result answers
        tool_use_id: String,
        /// Result content
        content: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Tool invocation (Anthropic content-block shape)
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Image URL structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    /// Detail level ("auto", "low", "high")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Inline audio payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    /// Base64 encoded audio bytes
    pub data: String,
    /// Audio format ("wav", "mp3")
    pub format: String,
}
