//! Fake providers for unit tests

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::providers::context::RequestContext;
use crate::core::providers::error::ProviderError;
use crate::core::providers::{ChunkStream, LlmProvider};
use crate::core::types::chat::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, FinishReason, ModelInfo, Usage,
};
use crate::core::types::health::ProbeReport;
use crate::core::types::streaming::{ChatChunk, ChatDelta, ChunkChoice};

/// Canned provider with a fixed reply, failure and health state.
#[derive(Debug)]
pub struct StaticProvider {
    pub name: String,
    pub model: String,
    pub reply: String,
    pub failure: Option<ProviderError>,
    pub healthy: bool,
    pub native_tools: bool,
    pub models: Vec<String>,
    pub calls: AtomicU64,
}

impl StaticProvider {
    pub fn replying(model: &str, reply: &str) -> Self {
        Self::named("static", model, reply)
    }

    pub fn named(name: &str, model: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            reply: reply.to_string(),
            failure: None,
            healthy: true,
            native_tools: true,
            models: vec![model.to_string()],
            calls: AtomicU64::new(0),
        }
    }

    pub fn failing(name: &str, failure: ProviderError) -> Self {
        let mut provider = Self::named(name, "m", "");
        provider.failure = Some(failure);
        provider
    }

    pub fn unhealthy(name: &str) -> Self {
        let mut provider = Self::named(name, "m", "ok");
        provider.healthy = false;
        provider
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn without_native_tools(mut self) -> Self {
        self.native_tools = false;
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LlmProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_native_function_calling(&self) -> bool {
        self.native_tools
    }

    async fn chat_completion(
        &self,
        _request: ChatRequest,
        _context: RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(ChatResponse {
            id: "resp-static".to_string(),
            provider: self.name.clone(),
            model: self.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::assistant(self.reply.clone()),
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            }),
            metadata: Default::default(),
        })
    }

    async fn chat_completion_stream(
        &self,
        _request: ChatRequest,
        _context: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let _ = tx.try_send(ChatChunk {
            id: "chunk-static".to_string(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChatDelta {
                    role: None,
                    content: Some(self.reply.clone()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
            error: None,
        });
        let _ = tx.try_send(ChatChunk {
            id: "chunk-static".to_string(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChatDelta::default(),
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: None,
            error: None,
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn health_check(&self) -> ProbeReport {
        if self.healthy {
            ProbeReport::healthy(5)
        } else {
            ProbeReport::unhealthy("static provider marked down")
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self
            .models
            .iter()
            .map(|id| ModelInfo {
                id: id.clone(),
                provider: self.name.clone(),
                created: None,
            })
            .collect())
    }
}
