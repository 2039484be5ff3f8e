//! Shared plumbing for all provider codecs

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::core::providers::ProviderError;
use crate::core::providers::context::RequestContext;
use crate::core::providers::profile::VendorProfile;
use crate::core::types::config::ProviderSettings;

/// Bound on in-flight chunks between the stream producer and its consumer.
pub const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Build the shared HTTP client for one provider. The connection pool is
/// process-wide per provider; tests point `base_url` at a mock server.
pub fn build_client(settings: &ProviderSettings) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(settings.timeout())
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| {
            ProviderError::invalid_request(&settings.name, format!("http client: {e}"))
        })
}

/// Effective API key for one call: the ambient-context override (trimmed,
/// non-empty) wins over the provider-configured key. Looked up at
/// serialization time on every request.
pub fn effective_api_key(
    provider: &str,
    context: &RequestContext,
    settings: &ProviderSettings,
) -> Result<String, ProviderError> {
    if let Some(key) = context.api_key_override() {
        return Ok(key.to_string());
    }
    settings
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .ok_or_else(|| ProviderError::auth_failed(provider, "API key is required"))
}

/// Base URL for one provider: configuration override, then profile default.
pub fn base_url<'a>(settings: &'a ProviderSettings, profile: &'static VendorProfile) -> &'a str {
    settings
        .base_url
        .as_deref()
        .map(|u| u.trim_end_matches('/'))
        .unwrap_or(profile.base_url)
}

/// Resolve the outbound model: request, then configured default, then the
/// vendor fallback constant. An empty result is an invalid request.
pub fn resolve_model(
    provider: &str,
    requested: &str,
    settings: &ProviderSettings,
    profile: &'static VendorProfile,
) -> Result<String, ProviderError> {
    let model = if !requested.is_empty() {
        requested
    } else if let Some(default) = settings.default_model.as_deref().filter(|m| !m.is_empty()) {
        default
    } else {
        profile.fallback_model
    };
    if model.is_empty() {
        return Err(ProviderError::invalid_request(provider, "no model resolved"));
    }
    Ok(model.to_string())
}

/// Retry-After seconds from upstream response headers, when present.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
