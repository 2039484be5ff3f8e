//! Health types for models and providers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling health record for one catalog model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHealth {
    pub model_id: String,
    pub healthy: bool,
    /// Success rate in [0, 1]
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ModelHealth {
    pub fn healthy(model_id: impl Into<String>, avg_latency_ms: f64) -> Self {
        Self {
            model_id: model_id.into(),
            healthy: true,
            success_rate: 1.0,
            avg_latency_ms,
            last_error: None,
            last_error_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn unhealthy(model_id: impl Into<String>, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            model_id: model_id.into(),
            healthy: false,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            last_error: Some(error.into()),
            last_error_at: Some(now),
            updated_at: now,
        }
    }
}

/// Result of a single provider probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub healthy: bool,
    pub latency_ms: u64,
    /// Observed error rate in [0, 1]
    pub error_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms,
            error_rate: 0.0,
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: 0,
            error_rate: 1.0,
            error: Some(error.into()),
        }
    }
}
