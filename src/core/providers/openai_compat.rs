//! OpenAI-compatible provider
//!
//! Speaks the `/chat/completions` wire shared by OpenAI, Grok, Qwen
//! (DashScope compatible mode), DeepSeek, GLM, Hunyuan, Kimi, Llama and
//! Mistral. The vendor profile supplies endpoints and quirk hooks; the
//! codec itself is identical across the family.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::providers::context::RequestContext;
use crate::core::providers::error::{ProviderError, map_upstream_status, redact_keys};
use crate::core::providers::profile::VendorProfile;
use crate::core::providers::rewrite::RewritePipeline;
use crate::core::providers::shared::{
    STREAM_CHANNEL_CAPACITY, base_url, build_client, effective_api_key, parse_retry_after,
    resolve_model,
};
use crate::core::providers::{ChunkStream, LlmProvider};
use crate::core::streaming::sse::{SseDecoder, SseLine, is_done_marker};
use crate::core::types::chat::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, FinishReason, ModelInfo, Usage,
};
use crate::core::types::config::ProviderSettings;
use crate::core::types::message::{MessageContent, MessageRole};
use crate::core::types::streaming::{ChatChunk, ChatDelta, ChunkChoice};
use crate::core::types::tools::{ToolCall, ToolCallDelta};

/// Provider adapter for the OpenAI-compatible wire family.
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    settings: ProviderSettings,
    profile: &'static VendorProfile,
    client: reqwest::Client,
    rewriters: RewritePipeline,
}

impl OpenAiCompatProvider {
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

    pub fn profile(&self) -> &'static VendorProfile {
        self.profile
    }

    pub(crate) fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn chat_url(&self) -> String {
        format!("{}{}", base_url(&self.settings, self.profile), self.profile.chat_path)
    }

    fn models_url(&self) -> String {
        format!("{}{}", base_url(&self.settings, self.profile), self.profile.models_path)
    }

    async fn execute_completion(
        &self,
        mut request: ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let provider = self.settings.name.clone();
        self.rewriters.apply(&provider, &mut request)?;
        let model = resolve_model(&provider, &request.model, &self.settings, self.profile)?;
        let body = build_chat_body(&request, &model, false);
        let api_key = effective_api_key(&provider, context, &self.settings)?;

        let mut http = self
            .client
            .post(self.chat_url())
            .bearer_auth(&api_key)
            .json(&body);
        if let Some(timeout) = context.timeout {
            http = http.timeout(timeout);
        }

        let response = tokio::select! {
            _ = context.cancellation().cancelled() => {
                return Err(ProviderError::cancelled(&provider, "request context cancelled"));
            }
            result = http.send() => {
                result.map_err(|e| ProviderError::from_reqwest(&provider, e))?
            }
        };

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
        decode_response(&provider, &model, &bytes)
    }

    async fn execute_stream(
        &self,
        mut request: ChatRequest,
        context: &RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        let provider = self.settings.name.clone();
        request.stream = true;
        self.rewriters.apply(&provider, &mut request)?;
        let model = resolve_model(&provider, &request.model, &self.settings, self.profile)?;
        let body = build_chat_body(&request, &model, true);
        let api_key = effective_api_key(&provider, context, &self.settings)?;

        let mut http = self
            .client
            .post(self.chat_url())
            .bearer_auth(&api_key)
            .json(&body);
        if let Some(timeout) = context.timeout {
            http = http.timeout(timeout);
        }

        let response = tokio::select! {
            _ = context.cancellation().cancelled() => {
                return Err(ProviderError::cancelled(&provider, "request context cancelled"));
            }
            result = http.send() => {
                result.map_err(|e| ProviderError::from_reqwest(&provider, e))?
            }
        };

        let (tx, rx) = mpsc::channel::<ChatChunk>(STREAM_CHANNEL_CAPACITY);

        let status = response.status();
        if !status.is_success() {
            // Opening -> Terminated: one mapped error chunk, then closure.
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            let err = map_upstream_status(&provider, status.as_u16(), &text, retry_after);
            let _ = tx.try_send(ChatChunk::from_error(err));
            drop(tx);
            return Ok(Box::pin(ReceiverStream::new(rx)));
        }

        let cancel = context.cancellation().clone();
        tokio::spawn(pump_openai_stream(provider, response, tx, cancel));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Reads the SSE body and produces canonical chunks. Owns the channel:
/// writes at most one terminal error chunk and closes exactly once by
/// dropping the sender. Nothing is read past `[DONE]`.
async fn pump_openai_stream(
    provider: String,
    response: reqwest::Response,
    tx: mpsc::Sender<ChatChunk>,
    cancel: CancellationToken,
) {
    let mut decoder = SseDecoder::new();
    let mut byte_stream = response.bytes_stream();
    let mut saw_done = false;

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
                    let SseLine::Data(payload) = line else { continue };
                    if is_done_marker(&payload) {
                        saw_done = true;
                        break 'read;
                    }
                    match decode_chunk(&provider, &payload) {
                        Ok(chunk) => {
                            if tx.send(chunk).await.is_err() {
                                // consumer went away
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = tx.send(ChatChunk::from_error(err)).await;
                            return;
                        }
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

    if !saw_done {
        let err = ProviderError::upstream(
            &provider,
            502,
            "stream ended without [DONE] terminator",
        );
        let _ = tx.send(ChatChunk::from_error(err)).await;
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn supports_native_function_calling(&self) -> bool {
        self.profile.native_tools
    }

    async fn chat_completion(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        self.execute_completion(request, &context).await
    }

    async fn chat_completion_stream(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        self.execute_stream(request, &context).await
    }

    async fn health_check(&self) -> crate::core::types::health::ProbeReport {
        use crate::core::types::health::ProbeReport;

        let started = std::time::Instant::now();
        let mut http = self.client.get(self.models_url());
        if let Some(key) = self.settings.api_key.as_deref() {
            http = http.bearer_auth(key);
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
        let mut http = self.client.get(self.models_url());
        if let Some(key) = self.settings.api_key.as_deref() {
            http = http.bearer_auth(key);
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
            created: Option<i64>,
        }

        let list: WireModelList = response.json().await.map_err(|e| {
            ProviderError::upstream(&provider, 502, format!("failed to parse model list: {e}"))
        })?;
        debug!(provider = %provider, count = list.data.len(), "listed models");
        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                provider: provider.clone(),
                created: m.created,
            })
            .collect())
    }
}

// ==================== request encoding ====================

/// Build the OpenAI-family JSON body. `stream: true` appears iff the
/// streaming entry point was used; unary bodies never set it.
pub(crate) fn build_chat_body(request: &ChatRequest, model: &str, stream: bool) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message_to_wire).collect();
    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if let Some(tools) = &request.tools {
        body["tools"] = serde_json::to_value(tools).unwrap_or(Value::Null);
    }
    if let Some(tool_choice) = &request.tool_choice {
        body["tool_choice"] = serde_json::to_value(tool_choice).unwrap_or(Value::Null);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

fn message_to_wire(message: &ChatMessage) -> Value {
    let mut wire = json!({ "role": message.role.to_string() });

    match &message.content {
        MessageContent::Text(text) => {
            if text.is_empty() && message.tool_calls.is_some() {
                wire["content"] = Value::Null;
            } else {
                wire["content"] = json!(text);
            }
        }
        MessageContent::Parts(parts) => {
            wire["content"] = serde_json::to_value(parts).unwrap_or(Value::Null);
        }
    }

    if let Some(calls) = &message.tool_calls {
        let wire_calls: Vec<Value> = calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments_string(),
                    },
                })
            })
            .collect();
        wire["tool_calls"] = Value::Array(wire_calls);
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(tool_call_id);
    }
    if let Some(name) = &message.name {
        wire["name"] = json!(name);
    }
    wire
}

// ==================== response decoding ====================

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    role: Option<String>,
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
    tool_call_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

fn role_from_wire(role: Option<&str>) -> MessageRole {
    match role {
        Some("system") => MessageRole::System,
        Some("user") => MessageRole::User,
        Some("tool") => MessageRole::Tool,
        _ => MessageRole::Assistant,
    }
}

pub(crate) fn decode_response(
    provider: &str,
    model: &str,
    bytes: &[u8],
) -> Result<ChatResponse, ProviderError> {
    let wire: WireResponse = serde_json::from_slice(bytes).map_err(|e| {
        ProviderError::upstream(provider, 502, format!("failed to parse response: {e}"))
    })?;

    let mut choices = Vec::with_capacity(wire.choices.len());
    for choice in wire.choices {
        let tool_calls = match choice.message.tool_calls {
            Some(calls) => Some(decode_tool_calls(provider, calls)?),
            None => None,
        };
        choices.push(ChatChoice {
            index: choice.index,
            message: ChatMessage {
                role: role_from_wire(choice.message.role.as_deref()),
                content: MessageContent::Text(choice.message.content.unwrap_or_default()),
                name: choice.message.name,
                tool_calls,
                tool_call_id: choice.message.tool_call_id,
            },
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
        });
    }

    Ok(ChatResponse {
        id: wire.id,
        provider: provider.to_string(),
        model: if wire.model.is_empty() {
            model.to_string()
        } else {
            wire.model
        },
        choices,
        usage: wire.usage,
        metadata: Default::default(),
    })
}

fn decode_tool_calls(
    provider: &str,
    calls: Vec<WireToolCall>,
) -> Result<Vec<ToolCall>, ProviderError> {
    calls
        .into_iter()
        .map(|call| {
            let raw = if call.function.arguments.is_empty() {
                "{}"
            } else {
                call.function.arguments.as_str()
            };
            let arguments: Value = serde_json::from_str(raw).map_err(|e| {
                ProviderError::upstream(
                    provider,
                    502,
                    format!("tool call arguments are not valid JSON: {e}"),
                )
            })?;
            Ok(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect()
}

// ==================== stream chunk decoding ====================

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<WireChunkChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireChunkChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: WireChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireChunkDelta {
    role: Option<String>,
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<Value>,
}

/// Decode one `data:` payload into a canonical chunk. Parse failure is a
/// retryable upstream error; the caller turns it into the terminal chunk.
pub(crate) fn decode_chunk(provider: &str, payload: &str) -> Result<ChatChunk, ProviderError> {
    let wire: WireChunk = serde_json::from_str(payload).map_err(|e| {
        ProviderError::upstream(provider, 502, format!("failed to parse stream chunk: {e}"))
    })?;

    let choices = wire
        .choices
        .into_iter()
        .map(|choice| ChunkChoice {
            index: choice.index,
            delta: ChatDelta {
                role: choice.delta.role.as_deref().map(|r| role_from_wire(Some(r))),
                content: choice.delta.content,
                tool_calls: choice.delta.tool_calls.map(|deltas| {
                    deltas
                        .into_iter()
                        .map(|d| {
                            let function = d.function.unwrap_or_default();
                            ToolCallDelta {
                                index: d.index,
                                id: d.id,
                                name: function.name,
                                // string fragments concatenate; raw values
                                // fall back to their JSON text
                                arguments: match function.arguments {
                                    Some(Value::String(s)) => s,
                                    Some(other) => other.to_string(),
                                    None => String::new(),
                                },
                            }
                        })
                        .collect()
                }),
            },
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
        })
        .collect();

    Ok(ChatChunk {
        id: wire.id,
        model: wire.model,
        choices,
        usage: wire.usage,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::tools::{FunctionDefinition, Tool};

    fn simple_request() -> ChatRequest {
        ChatRequest::new("gpt-4o", vec![ChatMessage::user("hi")])
    }

    #[test]
    fn unary_body_has_no_stream_flag() {
        let body = build_chat_body(&simple_request(), "gpt-4o", false);
        assert!(body.get("stream").is_none());
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn stream_body_sets_stream_true() {
        let body = build_chat_body(&simple_request(), "gpt-4o", true);
        assert_eq!(body["stream"], json!(true));
    }

    #[test]
    fn tools_are_wrapped_as_functions() {
        let mut request = simple_request();
        request.tools = Some(vec![Tool::function(FunctionDefinition {
            name: "get_weather".to_string(),
            description: Some("Weather lookup".to_string()),
            parameters: Some(json!({"type": "object"})),
        })]);
        let body = build_chat_body(&request, "gpt-4o", false);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn tool_message_preserves_call_id_and_name() {
        let message = ChatMessage::tool("call_9", "lookup", "42");
        let wire = message_to_wire(&message);
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_9");
        assert_eq!(wire["name"], "lookup");
        assert_eq!(wire["content"], "42");
    }

    #[test]
    fn non_tool_message_never_sets_call_id() {
        let wire = message_to_wire(&ChatMessage::user("hi"));
        assert!(wire.get("tool_call_id").is_none());
    }

    #[test]
    fn assistant_tool_calls_serialize_arguments_as_string() {
        let mut message = ChatMessage::assistant("");
        message.tool_calls = Some(vec![ToolCall::new(
            "call_1",
            "lookup",
            json!({"q": "rust"}),
        )]);
        let wire = message_to_wire(&message);
        assert_eq!(wire["content"], Value::Null);
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], "{\"q\":\"rust\"}");
    }

    #[test]
    fn decodes_unary_response_with_tool_calls() {
        let raw = json!({
            "id": "resp-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":1}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        });
        let response = decode_response("openai", "gpt-4o", raw.to_string().as_bytes()).unwrap();
        assert_eq!(response.choices.len(), 1);
        let calls = response.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].arguments, json!({"q": 1}));
        assert_eq!(
            response.choices[0].finish_reason,
            Some(FinishReason::ToolCalls)
        );
        assert_eq!(response.usage.unwrap().total_tokens, 8);
    }

    #[test]
    fn decode_chunk_maps_content_delta() {
        let payload = r#"{"id":"a","model":"m","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#;
        let chunk = decode_chunk("openai", payload).unwrap();
        assert_eq!(chunk.id, "a");
        assert_eq!(chunk.model, "m");
        assert_eq!(chunk.content(), Some("Hel"));
        assert!(!chunk.is_terminal());
    }

    #[test]
    fn decode_chunk_rejects_invalid_json() {
        let err = decode_chunk("openai", "{not json").unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status: 502, .. }));
        assert!(err.is_retryable());
        assert_eq!(err.provider(), "openai");
    }

    #[test]
    fn tool_call_delta_keeps_string_fragments_raw() {
        let payload = r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"f","arguments":"{\"a\":"}}]}}]}"#;
        let chunk = decode_chunk("openai", payload).unwrap();
        let deltas = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(deltas[0].arguments, "{\"a\":");
        assert_eq!(deltas[0].id.as_deref(), Some("c1"));
    }

    #[test]
    fn tool_call_delta_accepts_raw_json_values() {
        let payload = r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":{"a":1}}}]}}]}"#;
        let chunk = decode_chunk("openai", payload).unwrap();
        let deltas = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(deltas[0].arguments, "{\"a\":1}");
    }
}
