//! Shared model health store
//!
//! Process-wide map of per-model rolling health. Written by the background
//! checker and by in-band request outcomes, read by the weighted router.
//! A reader-writer lock over the map is all the correctness here needs;
//! readers never observe torn updates.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::core::types::health::ModelHealth;

/// Exponential smoothing factor for in-band observations.
const OBSERVATION_ALPHA: f64 = 0.1;

#[derive(Debug, Default)]
pub struct HealthStore {
    inner: RwLock<HashMap<String, ModelHealth>>,
}

impl HealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_id: &str) -> Option<ModelHealth> {
        self.inner.read().get(model_id).cloned()
    }

    pub fn all(&self) -> Vec<ModelHealth> {
        self.inner.read().values().cloned().collect()
    }

    /// Replace the record for a model (checker write-back path).
    pub fn set(&self, health: ModelHealth) {
        debug!(model = %health.model_id, healthy = health.healthy, "health record updated");
        self.inner.write().insert(health.model_id.clone(), health);
    }

    /// Fold an in-band success into the rolling record.
    pub fn record_success(&self, model_id: &str, latency_ms: f64) {
        let mut map = self.inner.write();
        let entry = map
            .entry(model_id.to_string())
            .or_insert_with(|| ModelHealth::healthy(model_id, latency_ms));
        entry.success_rate =
            entry.success_rate * (1.0 - OBSERVATION_ALPHA) + OBSERVATION_ALPHA;
        entry.avg_latency_ms = if entry.avg_latency_ms == 0.0 {
            latency_ms
        } else {
            entry.avg_latency_ms * (1.0 - OBSERVATION_ALPHA) + latency_ms * OBSERVATION_ALPHA
        };
        entry.healthy = true;
        entry.updated_at = Utc::now();
    }

    /// Fold an in-band failure into the rolling record.
    pub fn record_failure(&self, model_id: &str, error: &str) {
        let mut map = self.inner.write();
        let now = Utc::now();
        let entry = map
            .entry(model_id.to_string())
            .or_insert_with(|| ModelHealth::unhealthy(model_id, error));
        entry.success_rate *= 1.0 - OBSERVATION_ALPHA;
        entry.healthy = entry.success_rate >= 0.5;
        entry.last_error = Some(error.to_string());
        entry.last_error_at = Some(now);
        entry.updated_at = now;
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
