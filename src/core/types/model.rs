//! Model catalog entries used by the routing plane

use serde::{Deserialize, Serialize};

/// SLA bounds for one catalog entry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SlaBounds {
    /// Budget cap per request (USD)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost_per_request: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    /// Minimum acceptable success rate in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_success_rate: Option<f64>,
}

/// One model offered by one provider, with routing weights and prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Provider code this model is served by
    pub provider: String,
    /// Model id sent on the wire
    pub model_id: String,
    /// Display name used for preferred-model matching
    pub model_name: String,
    /// Capability tags ("fast", "cheap", "jsonify", ...)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Price per 1k input tokens (USD)
    #[serde(default)]
    pub input_price: f64,
    /// Price per 1k output tokens (USD)
    #[serde(default)]
    pub output_price: f64,
    /// Base selection weight
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub cost_weight: f64,
    #[serde(default)]
    pub latency_weight: f64,
    #[serde(default)]
    pub quality_weight: f64,
    /// SLA bounds
    #[serde(default)]
    pub sla: SlaBounds,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> f64 {
    100.0
}

fn default_enabled() -> bool {
    true
}

impl ModelCandidate {
    pub fn new(
        provider: impl Into<String>,
        model_id: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            model_name: model_name.into(),
            tags: Vec::new(),
            input_price: 0.0,
            output_price: 0.0,
            weight: default_weight(),
            cost_weight: 0.0,
            latency_weight: 0.0,
            quality_weight: 0.0,
            sla: SlaBounds::default(),
            enabled: true,
        }
    }

    /// Cost estimate for a nominal two-k-token exchange.
    pub fn estimated_cost(&self) -> f64 {
        (self.input_price + self.output_price) * 2.0
    }
}
