//! Canonical data model for the dispatch plane
//!
//! Requests and responses are normalized here once; every provider codec
//! translates between these shapes and its vendor wire format.

pub mod chat;
pub mod config;
pub mod content;
pub mod health;
pub mod message;
pub mod model;
pub mod streaming;
pub mod tools;

pub use chat::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, FinishReason, ModelInfo, ReasoningMode,
    RouteHints, Usage,
};
pub use config::{HealthCheckSettings, LlmConfig, PrefixRule, ProviderSettings};
pub use content::{AudioData, ContentPart, ImageUrl};
pub use health::{ModelHealth, ProbeReport};
pub use message::{MessageContent, MessageRole};
pub use model::{ModelCandidate, SlaBounds};
pub use streaming::{ChatChunk, ChatDelta, ChunkChoice};
pub use tools::{
    FunctionChoice, FunctionDefinition, Tool, ToolCall, ToolCallDelta, ToolChoice, ToolType,
};
