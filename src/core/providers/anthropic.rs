//! Anthropic Messages provider
//!
//! Structurally distinct from the OpenAI family: the API key travels in a
//! non-bearer `x-api-key` header, system messages are hoisted out of the
//! message list into a top-level field, content is always an array of
//! typed parts, tool results ride in user-role messages as `tool_result`
//! parts, and streaming uses named SSE events. The canonical chunk
//! semantics on output are identical to every other family.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::core::providers::context::RequestContext;
use crate::core::providers::error::{ProviderError, map_upstream_status, redact_keys};
use crate::core::providers::profile::VendorProfile;
use crate::core::providers::rewrite::RewritePipeline;
use crate::core::providers::shared::{
    STREAM_CHANNEL_CAPACITY, base_url, build_client, effective_api_key, parse_retry_after,
    resolve_model,
};
use crate::core::providers::{ChunkStream, LlmProvider};
use crate::core::streaming::sse::{SseDecoder, SseLine};
use crate::core::types::chat::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, FinishReason, ModelInfo, Usage,
};
use crate::core::types::config::ProviderSettings;
use crate::core::types::message::{MessageContent, MessageRole};
use crate::core::types::streaming::{ChatChunk, ChatDelta, ChunkChoice};
use crate::core::types::tools::{ToolCall, ToolCallDelta};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Provider adapter for the Anthropic Messages wire.
#[derive(Debug)]
pub struct AnthropicProvider {
    settings: ProviderSettings,
    profile: &'static VendorProfile,
    client: reqwest::Client,
    rewriters: RewritePipeline,
}

impl AnthropicProvider {
    pub fn new(
        profile: &'static VendorProfile,
        settings: ProviderSettings,
    ) -> Result<Self, ProviderError> {
        let client = build_client(&settings)?;
        let rewriters = RewritePipeline::standard(profile);
        Ok(Self {
            settings,
            profile,
            client,
            rewriters,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}{}", base_url(&self.settings, self.profile), self.profile.chat_path)
    }

    fn models_url(&self) -> String {
        format!("{}{}", base_url(&self.settings, self.profile), self.profile.models_path)
    }

    async fn send_request(
        &self,
        body: &Value,
        context: &RequestContext,
    ) -> Result<reqwest::Response, ProviderError> {
        let provider = self.settings.name.as_str();
        let api_key = effective_api_key(provider, context, &self.settings)?;
        let mut http = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body);
        if let Some(timeout) = context.timeout {
            http = http.timeout(timeout);
        }

        tokio::select! {
            _ = context.cancellation().cancelled() => {
                Err(ProviderError::cancelled(provider, "request context cancelled"))
            }
            result = http.send() => {
                result.map_err(|e| ProviderError::from_reqwest(provider, e))
            }
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn supports_native_function_calling(&self) -> bool {
        self.profile.native_tools
    }

    async fn chat_completion(
        &self,
        mut request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let provider = self.settings.name.clone();
        self.rewriters.apply(&provider, &mut request)?;
        let model = resolve_model(&provider, &request.model, &self.settings, self.profile)?;
        let body = build_messages_body(&request, &model, false);

        let response = self.send_request(&body, &context).await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(map_upstream_status(&provider, status.as_u16(), &text, retry_after));
        }

        let bytes = tokio::select! {
            _ = context.cancellation().cancelled() => {
                return Err(ProviderError::cancelled(&provider, "request context cancelled"));
            }
            result = response.bytes() => {
                result.map_err(|e| ProviderError::from_reqwest(&provider, e))?
            }
        };
        decode_messages_response(&provider, &model, &bytes)
    }

    async fn chat_completion_stream(
        &self,
        mut request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        let provider = self.settings.name.clone();
        request.stream = true;
        self.rewriters.apply(&provider, &mut request)?;
        let model = resolve_model(&provider, &request.model, &self.settings, self.profile)?;
        let body = build_messages_body(&request, &model, true);

        let response = self.send_request(&body, &context).await?;
        let (tx, rx) = mpsc::channel::<ChatChunk>(STREAM_CHANNEL_CAPACITY);

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            let err = map_upstream_status(&provider, status.as_u16(), &text, retry_after);
            let _ = tx.try_send(ChatChunk::from_error(err));
            drop(tx);
            return Ok(Box::pin(ReceiverStream::new(rx)));
        }

        let cancel = context.cancellation().clone();
        tokio::spawn(pump_anthropic_stream(provider, response, tx, cancel));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn health_check(&self) -> crate::core::types::health::ProbeReport {
        use crate::core::types::health::ProbeReport;

        let started = std::time::Instant::now();
        let mut http = self
            .client
            .get(self.models_url())
            .header("anthropic-version", ANTHROPIC_VERSION);
        if let Some(key) = self.settings.api_key.as_deref() {
            http = http.header("x-api-key", key);
        }
        match http.send().await {
            Ok(response) if response.status().is_success() => {
                ProbeReport::healthy(started.elapsed().as_millis() as u64)
            }
            Ok(response) => ProbeReport::unhealthy(format!(
                "probe returned status {}",
                response.status().as_u16()
            )),
            Err(e) => ProbeReport::unhealthy(redact_keys(&e.to_string())),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let provider = self.settings.name.clone();
        let mut http = self
            .client
            .get(self.models_url())
            .header("anthropic-version", ANTHROPIC_VERSION);
        if let Some(key) = self.settings.api_key.as_deref() {
            http = http.header("x-api-key", key);
        }
        let response = http
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&provider, e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_upstream_status(&provider, status.as_u16(), &text, None));
        }

        #[derive(Deserialize)]
        struct WireModelList {
            #[serde(default)]
            data: Vec<WireModel>,
        }
        #[derive(Deserialize)]
        struct WireModel {
            id: String,
        }

        let list: WireModelList = response.json().await.map_err(|e| {
            ProviderError::upstream(&provider, 502, format!("failed to parse model list: {e}"))
        })?;
        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                provider: provider.clone(),
                created: None,
            })
            .collect())
    }
}

// ==================== request encoding ====================

/// Build the Messages body: system hoisted to the top level, every
/// message's content rendered as typed parts, tool results wrapped in
/// user-role messages referring to their `tool_use` id.
pub(crate) fn build_messages_body(request: &ChatRequest, model: &str, stream: bool) -> Value {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();

    for message in &request.messages {
        match message.role {
            MessageRole::System => system_parts.push(message.content.as_text()),
            MessageRole::User => messages.push(json!({
                "role": "user",
                "content": [{"type": "text", "text": message.content.as_text()}],
            })),
            MessageRole::Assistant => {
                let mut parts: Vec<Value> = Vec::new();
                let text = message.content.as_text();
                if !text.is_empty() {
                    parts.push(json!({"type": "text", "text": text}));
                }
                if let Some(calls) = &message.tool_calls {
                    for call in calls {
                        parts.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                }
                messages.push(json!({"role": "assistant", "content": parts}));
            }
            MessageRole::Tool => messages.push(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content.as_text(),
                }],
            })),
        }
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if !system_parts.is_empty() {
        body["system"] = json!(system_parts.join("\n"));
    }
    if let Some(tools) = &request.tools {
        let wire_tools: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.function.name,
                    "description": tool.function.description,
                    "input_schema": tool.function.parameters,
                })
            })
            .collect();
        body["tools"] = Value::Array(wire_tools);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

// ==================== response decoding ====================

#[derive(Debug, Deserialize)]
struct WireMessagesResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<WireContentBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        }
    }
}

pub(crate) fn decode_messages_response(
    provider: &str,
    model: &str,
    bytes: &[u8],
) -> Result<ChatResponse, ProviderError> {
    let wire: WireMessagesResponse = serde_json::from_slice(bytes).map_err(|e| {
        ProviderError::upstream(provider, 502, format!("failed to parse response: {e}"))
    })?;

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    for block in wire.content {
        match block {
            WireContentBlock::Text { text: t } => text.push_str(&t),
            WireContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name, input));
            }
            WireContentBlock::Unknown => {}
        }
    }

    let finish_reason = wire
        .stop_reason
        .as_deref()
        .map(FinishReason::from_wire)
        .or(Some(FinishReason::Stop));

    Ok(ChatResponse {
        id: wire.id,
        provider: provider.to_string(),
        model: if wire.model.is_empty() {
            model.to_string()
        } else {
            wire.model
        },
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: MessageRole::Assistant,
                content: MessageContent::Text(text),
                name: None,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            },
            finish_reason,
        }],
        usage: wire.usage.map(Usage::from),
        metadata: Default::default(),
    })
}

// ==================== stream decoding ====================

/// Reads the named-event SSE body and produces canonical chunks. The
/// `message_stop` event terminates the stream; everything after it is
/// never read.
async fn pump_anthropic_stream(
    provider: String,
    response: reqwest::Response,
    tx: mpsc::Sender<ChatChunk>,
    cancel: CancellationToken,
) {
    let mut decoder = SseDecoder::new();
    let mut byte_stream = response.bytes_stream();
    let mut state = AnthropicStreamState::default();
    let mut stopped = false;

    'read: loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                let err = ProviderError::cancelled(&provider, "request context cancelled");
                let _ = tx.send(ChatChunk::from_error(err)).await;
                return;
            }
            frame = byte_stream.next() => frame,
        };

        match frame {
            Some(Ok(bytes)) => {
                for line in decoder.push(&bytes) {
                    match line {
                        SseLine::Event(name) => state.current_event = name,
                        SseLine::Data(payload) => {
                            match state.handle_event(&provider, &payload) {
                                Ok(AnthropicEventOutcome::Emit(chunk)) => {
                                    if tx.send(chunk).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(AnthropicEventOutcome::Stop) => {
                                    stopped = true;
                                    break 'read;
                                }
                                Ok(AnthropicEventOutcome::Ignore) => {}
                                Err(err) => {
                                    let _ = tx.send(ChatChunk::from_error(err)).await;
                                    return;
                                }
                            }
                        }
                        SseLine::Blank => {}
                    }
                }
            }
            Some(Err(e)) => {
                let err = ProviderError::from_reqwest(&provider, e);
                let _ = tx.send(ChatChunk::from_error(err)).await;
                return;
            }
            None => break,
        }
    }

    if !stopped {
        let err = ProviderError::upstream(&provider, 502, "stream ended without message_stop");
        let _ = tx.send(ChatChunk::from_error(err)).await;
    }
}

#[derive(Debug)]
enum AnthropicEventOutcome {
    Emit(ChatChunk),
    Stop,
    Ignore,
}

#[derive(Debug, Default)]
struct AnthropicStreamState {
    current_event: String,
    message_id: String,
    model: String,
}

impl AnthropicStreamState {
    fn handle_event(
        &mut self,
        provider: &str,
        payload: &str,
    ) -> Result<AnthropicEventOutcome, ProviderError> {
        let value: Value = serde_json::from_str(payload).map_err(|e| {
            ProviderError::upstream(provider, 502, format!("failed to parse stream event: {e}"))
        })?;
        // event name may come from the event line or the payload's type
        let event = if self.current_event.is_empty() {
            value.get("type").and_then(Value::as_str).unwrap_or("")
        } else {
            self.current_event.as_str()
        }
        .to_string();
        self.current_event.clear();

        match event.as_str() {
            "message_start" => {
                let message = value.get("message").cloned().unwrap_or(Value::Null);
                self.message_id = message
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.model = message
                    .get("model")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(AnthropicEventOutcome::Emit(self.chunk(ChatDelta {
                    role: Some(MessageRole::Assistant),
                    content: None,
                    tool_calls: None,
                })))
            }
            "content_block_start" => {
                let index = value.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                let block = value.get("content_block").cloned().unwrap_or(Value::Null);
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let delta = ToolCallDelta {
                        index,
                        id: block
                            .get("id")
                            .and_then(Value::as_str)
                            .map(String::from),
                        name: block
                            .get("name")
                            .and_then(Value::as_str)
                            .map(String::from),
                        arguments: String::new(),
                    };
                    Ok(AnthropicEventOutcome::Emit(self.chunk(ChatDelta {
                        role: None,
                        content: None,
                        tool_calls: Some(vec![delta]),
                    })))
                } else {
                    Ok(AnthropicEventOutcome::Ignore)
                }
            }
            "content_block_delta" => {
                let index = value.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                let delta = value.get("delta").cloned().unwrap_or(Value::Null);
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = delta
                            .get("text")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        Ok(AnthropicEventOutcome::Emit(self.chunk(ChatDelta {
                            role: None,
                            content: Some(text),
                            tool_calls: None,
                        })))
                    }
                    Some("input_json_delta") => {
                        let fragment = delta
                            .get("partial_json")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        Ok(AnthropicEventOutcome::Emit(self.chunk(ChatDelta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ToolCallDelta {
                                index,
                                id: None,
                                name: None,
                                arguments: fragment,
                            }]),
                        })))
                    }
                    _ => Ok(AnthropicEventOutcome::Ignore),
                }
            }
            "message_delta" => {
                let stop_reason = value
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str)
                    .map(FinishReason::from_wire);
                let usage = value.get("usage").and_then(|u| {
                    let output = u.get("output_tokens")?.as_u64()? as u32;
                    Some(Usage {
                        prompt_tokens: 0,
                        completion_tokens: output,
                        total_tokens: output,
                    })
                });
                let mut chunk = self.chunk(ChatDelta::default());
                chunk.usage = usage;
                if let Some(choice) = chunk.choices.first_mut() {
                    choice.finish_reason = stop_reason;
                }
                Ok(AnthropicEventOutcome::Emit(chunk))
            }
            "message_stop" => Ok(AnthropicEventOutcome::Stop),
            "error" => {
                let message = value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("upstream stream error");
                Err(ProviderError::upstream(provider, 502, message))
            }
            // ping and future event types
            _ => Ok(AnthropicEventOutcome::Ignore),
        }
    }

    fn chunk(&self, delta: ChatDelta) -> ChatChunk {
        ChatChunk {
            id: self.message_id.clone(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            usage: None,
            error: None,
        }
    }
}
