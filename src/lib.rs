//! # AgentFlow LLM
//!
//! The LLM dispatch plane of AgentFlow: accepts a normalized chat request
//! and delivers it to exactly one upstream provider, with health-aware
//! routing, streaming decode, partial-failure recovery and request and
//! response normalization across wire-incompatible backends.
//!
//! ## Layout
//!
//! - **Provider adapters** translate a canonical [`ChatRequest`] into each
//!   vendor's wire protocol (OpenAI-compatible, Anthropic Messages,
//!   MiniMax XML tool calls) and decode both unary JSON and SSE streams
//!   back into canonical values.
//! - **Weighted router** picks one candidate from the model catalog using
//!   cost, latency, success-rate, SLA, tag and sticky signals, with a
//!   fast-path prefix match.
//! - **A/B router** splits traffic deterministically by user, session or
//!   tenant hash; each variant is itself a provider.
//! - **Health checker** probes providers in the background and feeds
//!   success-rate and latency back into the router.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agentflow_llm::{
//!     ChatMessage, ChatRequest, LlmProvider, Provider, RequestContext,
//! };
//! use agentflow_llm::core::types::config::ProviderSettings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut settings = ProviderSettings::new("openai");
//!     settings.api_key = Some("sk-...".to_string());
//!     let provider = Provider::from_settings(settings)?;
//!
//!     let request = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("Hello!")]);
//!     let response = provider
//!         .chat_completion(request, RequestContext::new())
//!         .await?;
//!     println!("{}", response.choices[0].message.content.as_text());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod core;

// Re-export the main surface
pub use crate::core::health::HealthChecker;
pub use crate::core::providers::{
    AnthropicProvider, ChunkStream, LlmProvider, MiniMaxProvider, ObservedProvider,
    OpenAiCompatProvider, Provider, ProviderError, RequestContext, RequestRewriter,
    RewritePipeline, build_providers, extract_xml_tool_calls,
};
pub use crate::core::router::{
    AbTestConfig, AbTestRouter, AbVariant, HealthStore, PrefixRouter, RouteError, RouteRequest,
    RouteResult, StickyKeySelector, WeightedRouter, load_candidates,
};
pub use crate::core::streaming::ToolCallAccumulator;
pub use crate::core::types::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, FinishReason, LlmConfig, MessageContent,
    MessageRole, ModelCandidate, ModelHealth, ModelInfo, ProbeReport, ReasoningMode, RouteHints,
    Tool, ToolCall, ToolCallDelta, Usage,
};
