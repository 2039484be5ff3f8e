//! Provider adapters
//!
//! Every upstream API family is reached through the uniform [`LlmProvider`]
//! capability surface. The family itself is a tagged variant, not a deep
//! hierarchy: vendor quirks live in profile hooks, the codecs are shared
//! per wire family.

pub mod anthropic;
pub mod context;
pub mod error;
pub mod minimax;
pub mod observed;
pub mod openai_compat;
pub mod profile;
pub mod rewrite;
pub mod shared;

#[cfg(test)]
pub(crate) mod testing;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

pub use anthropic::AnthropicProvider;
pub use context::RequestContext;
pub use error::{ProviderError, map_upstream_status, redact_keys};
pub use minimax::{MiniMaxProvider, extract_xml_tool_calls};
pub use observed::ObservedProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use profile::{VendorProfile, WireFamily, profile_for};
pub use rewrite::{RequestRewriter, RewritePipeline};

use crate::core::types::chat::{ChatRequest, ChatResponse, ModelInfo};
use crate::core::types::config::ProviderSettings;
use crate::core::types::health::ProbeReport;
use crate::core::types::streaming::ChatChunk;

/// A stream of canonical chunks. Ends with exactly one terminal chunk
/// (finish reason or in-band error); the channel closes right after it.
pub type ChunkStream = Pin<Box<dyn Stream<Item = ChatChunk> + Send>>;

/// Uniform capability surface over one upstream LLM API family.
///
/// Optional capabilities default to a `NotSupported` error naming the
/// feature. Providers that cannot natively invoke tools return false from
/// `supports_native_function_calling`; callers fall back to a
/// prompt-wrapping strategy upstream of this crate.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Provider label, unique across the process. Used in routing,
    /// logging and error messages.
    fn name(&self) -> &str;

    fn supports_native_function_calling(&self) -> bool;

    /// Unary chat completion.
    async fn chat_completion(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChatResponse, ProviderError>;

    /// Streaming chat completion.
    async fn chat_completion_stream(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChunkStream, ProviderError>;

    /// Probe upstream availability.
    async fn health_check(&self) -> ProbeReport;

    /// Models the upstream currently offers.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    async fn embeddings(
        &self,
        _input: Vec<String>,
        _context: RequestContext,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::not_supported(self.name(), "embeddings"))
    }

    async fn image_generation(
        &self,
        _prompt: String,
        _context: RequestContext,
    ) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::not_supported(self.name(), "image_generation"))
    }

    async fn audio_transcription(
        &self,
        _audio: Vec<u8>,
        _context: RequestContext,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::not_supported(self.name(), "audio_transcription"))
    }
}

/// Tagged provider over the three wire families.
#[derive(Debug)]
pub enum Provider {
    OpenAiCompat(OpenAiCompatProvider),
    Anthropic(AnthropicProvider),
    MiniMax(MiniMaxProvider),
}

impl Provider {
    /// Build a provider from configuration. The wire family comes from the
    /// explicit `family` setting or from the built-in profile matching the
    /// provider code; unknown codes with a configured base URL speak the
    /// OpenAI-compatible wire.
    pub fn from_settings(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let profile = profile_for(settings.family.as_deref().unwrap_or(&settings.name))
            .or_else(|| profile_for(&settings.name));

        match profile {
            Some(profile) => match profile.family {
                WireFamily::OpenAiCompat => Ok(Provider::OpenAiCompat(
                    OpenAiCompatProvider::new(profile, settings)?,
                )),
                WireFamily::Anthropic => {
                    Ok(Provider::Anthropic(AnthropicProvider::new(profile, settings)?))
                }
                WireFamily::MiniMaxXml => Ok(Provider::MiniMax(MiniMaxProvider::with_profile(
                    profile, settings,
                )?)),
            },
            None => {
                if settings.base_url.is_none() {
                    return Err(ProviderError::invalid_request(
                        &settings.name,
                        "unknown provider without a configured base_url",
                    ));
                }
                Ok(Provider::OpenAiCompat(OpenAiCompatProvider::new(
                    &profile::GENERIC_OPENAI,
                    settings,
                )?))
            }
        }
    }
}

#[async_trait]
impl LlmProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::OpenAiCompat(p) => p.name(),
            Provider::Anthropic(p) => p.name(),
            Provider::MiniMax(p) => p.name(),
        }
    }

    fn supports_native_function_calling(&self) -> bool {
        match self {
            Provider::OpenAiCompat(p) => p.supports_native_function_calling(),
            Provider::Anthropic(p) => p.supports_native_function_calling(),
            Provider::MiniMax(p) => p.supports_native_function_calling(),
        }
    }

    async fn chat_completion(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        match self {
            Provider::OpenAiCompat(p) => p.chat_completion(request, context).await,
            Provider::Anthropic(p) => p.chat_completion(request, context).await,
            Provider::MiniMax(p) => p.chat_completion(request, context).await,
        }
    }

    async fn chat_completion_stream(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        match self {
            Provider::OpenAiCompat(p) => p.chat_completion_stream(request, context).await,
            Provider::Anthropic(p) => p.chat_completion_stream(request, context).await,
            Provider::MiniMax(p) => p.chat_completion_stream(request, context).await,
        }
    }

    async fn health_check(&self) -> ProbeReport {
        match self {
            Provider::OpenAiCompat(p) => p.health_check().await,
            Provider::Anthropic(p) => p.health_check().await,
            Provider::MiniMax(p) => p.health_check().await,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        match self {
            Provider::OpenAiCompat(p) => p.list_models().await,
            Provider::Anthropic(p) => p.list_models().await,
            Provider::MiniMax(p) => p.list_models().await,
        }
    }
}

/// Build every configured provider, keyed by provider code. Invoked at
/// boot; the health checker and routers share the resulting handles.
pub fn build_providers(
    config: &crate::core::types::config::LlmConfig,
) -> Result<std::collections::HashMap<String, std::sync::Arc<Provider>>, ProviderError> {
    let mut providers = std::collections::HashMap::new();
    for settings in &config.providers {
        let provider = Provider::from_settings(settings.clone())?;
        providers.insert(settings.name.clone(), std::sync::Arc::new(provider));
    }
    Ok(providers)
}
