//! In-band health feedback
//!
//! Decorator that records per-model success, failure and latency into the
//! shared health store after every unary call, so routing reacts to real
//! traffic between checker ticks. Cancellations are not outcomes and are
//! not recorded.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::core::providers::context::RequestContext;
use crate::core::providers::error::ProviderError;
use crate::core::providers::{ChunkStream, LlmProvider};
use crate::core::router::health_store::HealthStore;
use crate::core::types::chat::{ChatRequest, ChatResponse, ModelInfo};

/// Wraps a provider and feeds call outcomes into the health store.
#[derive(Debug, Clone)]
pub struct ObservedProvider {
    inner: Arc<dyn LlmProvider>,
    store: Arc<HealthStore>,
}

impl ObservedProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, store: Arc<HealthStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl LlmProvider for ObservedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports_native_function_calling(&self) -> bool {
        self.inner.supports_native_function_calling()
    }

    async fn chat_completion(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let started = Instant::now();
        let result = self.inner.chat_completion(request, context).await;
        match &result {
            Ok(response) => {
                let latency_ms = started.elapsed().as_millis() as f64;
                self.store.record_success(&response.model, latency_ms);
            }
            Err(ProviderError::Cancelled { .. }) => {}
            Err(err) => {
                // resolved model is unknown on failure; attribute to the
                // provider-level pseudo record
                self.store.record_failure(self.inner.name(), &err.to_string());
            }
        }
        result
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
