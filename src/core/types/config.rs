//! Dispatch-plane configuration types
//!
//! The structs here are plain serde targets; reading them from a file (or
//! any other source) is the embedding application's job. The catalog is
//! rebuilt from `models` on every live reload.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model::ModelCandidate;

/// Settings for one configured provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider code, unique across the config ("openai", "deepseek", ...)
    pub name: String,
    /// Wire family ("openai", "anthropic", "minimax"); defaults to the
    /// OpenAI-compatible family
    #[serde(default)]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override; the vendor profile default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Default model when the request leaves `model` empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Per-request HTTP timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: None,
            api_key: None,
            base_url: None,
            default_model: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One prefix routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixRule {
    /// Model-id prefix, matched case-sensitively
    pub prefix: String,
    /// Provider code the prefix maps to
    pub provider: String,
}

/// Health checker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    10
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl HealthCheckSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Root configuration for the dispatch plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
    /// Model catalog; feeds `load_candidates`
    #[serde(default)]
    pub models: Vec<ModelCandidate>,
    #[serde(default)]
    pub prefix_rules: Vec<PrefixRule>,
    #[serde(default)]
    pub health: HealthCheckSettings,
}

impl LlmConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.name == name)
    }
}
