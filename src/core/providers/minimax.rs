//! MiniMax provider
//!
//! Speaks the OpenAI-compatible wire, but the model emits tool calls as
//! XML text inside `content`:
//!
//! ```text
//! <tool_calls>
//! {"name": "lookup", "arguments": {"q": 1}}
//! </tool_calls>
//! ```
//!
//! Unary responses are post-processed here. For streams the block can only
//! be recognized once content accumulation completes, so consumers run the
//! accumulated text through [`extract_xml_tool_calls`] themselves.
//! Malformed blocks surface as upstream errors, never as a silent drop.

use async_trait::async_trait;

use crate::core::providers::context::RequestContext;
use crate::core::providers::error::ProviderError;
use crate::core::providers::openai_compat::OpenAiCompatProvider;
use crate::core::providers::profile::{MINIMAX, VendorProfile};
use crate::core::providers::{ChunkStream, LlmProvider};
use crate::core::types::chat::{ChatRequest, ChatResponse, FinishReason, ModelInfo};
use crate::core::types::config::ProviderSettings;
use crate::core::types::message::MessageContent;
use crate::core::types::tools::ToolCall;

const OPEN_TAG: &str = "<tool_calls>";
const CLOSE_TAG: &str = "</tool_calls>";

/// Provider adapter for MiniMax.
#[derive(Debug)]
pub struct MiniMaxProvider {
    inner: OpenAiCompatProvider,
}

impl MiniMaxProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        Self::with_profile(&MINIMAX, settings)
    }

    pub fn with_profile(
        profile: &'static VendorProfile,
        settings: ProviderSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            inner: OpenAiCompatProvider::new(profile, settings)?,
        })
    }
}

#[async_trait]
impl LlmProvider for MiniMaxProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports_native_function_calling(&self) -> bool {
        // tool calls arrive as XML text, not as a native wire field
        false
    }

    async fn chat_completion(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let provider = self.name().to_string();
        let mut response = self.inner.chat_completion(request, context).await?;
        for choice in &mut response.choices {
            let text = choice.message.content.as_text();
            if let Some((cleaned, calls)) = extract_xml_tool_calls(&provider, &text)? {
                choice.message.content = MessageContent::Text(cleaned);
                choice.message.tool_calls = Some(calls);
                choice.finish_reason = Some(FinishReason::ToolCalls);
            }
        }
        Ok(response)
    }

    async fn chat_completion_stream(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        self.inner.chat_completion_stream(request, context).await
    }

    async fn health_check(&self) -> crate::core::types::health::ProbeReport {
        self.inner.health_check().await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        self.inner.list_models().await
    }
}

/// Pull an XML tool-call block out of accumulated content.
///
/// Returns the content with the block removed plus the parsed calls, or
/// `None` when no block is present. A block that is unterminated or whose
/// payload is not valid JSON is an upstream error.
pub fn extract_xml_tool_calls(
    provider: &str,
    content: &str,
) -> Result<Option<(String, Vec<ToolCall>)>, ProviderError> {
    let Some(start) = content.find(OPEN_TAG) else {
        return Ok(None);
    };
    let after_open = start + OPEN_TAG.len();
    let Some(close_offset) = content[after_open..].find(CLOSE_TAG) else {
        return Err(ProviderError::upstream(
            provider,
            502,
            "unterminated <tool_calls> block in content",
        ));
    };
    let payload = content[after_open..after_open + close_offset].trim();

    let value: serde_json::Value = serde_json::from_str(payload).map_err(|e| {
        ProviderError::upstream(
            provider,
            502,
            format!("tool_calls block is not valid JSON: {e}"),
        )
    })?;

    let raw_calls = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => {
            return Err(ProviderError::upstream(
                provider,
                502,
                "tool_calls block must be a JSON object or array",
            ));
        }
    };

    let mut calls = Vec::with_capacity(raw_calls.len());
    for (position, raw) in raw_calls.into_iter().enumerate() {
        let name = raw
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ProviderError::upstream(provider, 502, "tool call in block is missing a name")
            })?
            .to_string();
        let id = raw
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("call_{position}"));
        let arguments = match raw.get("arguments").cloned() {
            // string-wrapped JSON arguments get one more parse
            Some(serde_json::Value::String(s)) => serde_json::from_str(&s).map_err(|e| {
                ProviderError::upstream(
                    provider,
                    502,
                    format!("tool call arguments are not valid JSON: {e}"),
                )
            })?,
            Some(other) => other,
            None => serde_json::json!({}),
        };
        calls.push(ToolCall {
            id,
            name,
            arguments,
        });
    }

    let mut cleaned = String::with_capacity(content.len());
    cleaned.push_str(content[..start].trim_end());
    let rest = content[after_open + close_offset + CLOSE_TAG.len()..].trim_start();
    if !cleaned.is_empty() && !rest.is_empty() {
        cleaned.push('\n');
    }
    cleaned.push_str(rest);

    Ok(Some((cleaned, calls)))
}
