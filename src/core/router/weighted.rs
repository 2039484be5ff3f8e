//! Weighted router
//!
//! Pre-dispatch selector: combines the model catalog, shared health store
//! and per-request constraints into a scored candidate set, then picks one
//! `(provider, model)` pair. Not a provider itself; the application layer
//! consults it before dispatching.

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::router::error::RouteError;
use crate::core::router::health_store::HealthStore;
use crate::core::router::prefix::PrefixRouter;
use crate::core::types::config::LlmConfig;
use crate::core::types::health::ModelHealth;
use crate::core::types::model::ModelCandidate;

/// Score attached to fast-path prefix matches.
const PREFIX_MATCH_SCORE: f64 = 1000.0;
/// Score bonus when the request prefers this candidate by name.
const PREFERRED_BONUS: f64 = 200.0;
/// Flat optimism bonus for candidates with no health sample yet.
const NO_SAMPLE_BONUS: f64 = 50.0;

/// Routing request from the application layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Candidate must share at least one tag when non-empty
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,
}

/// Routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub provider: String,
    pub model_id: String,
    pub model_name: String,
    pub score: f64,
    pub reason: String,
}

/// Build the candidate catalog from configuration. Invoked at boot and
/// again on every live reload.
pub fn load_candidates(config: &LlmConfig) -> Vec<ModelCandidate> {
    info!(count = config.models.len(), "loaded model candidates");
    config.models.clone()
}

/// Health-aware weighted selector over the model catalog.
#[derive(Debug)]
pub struct WeightedRouter {
    catalog: RwLock<Vec<ModelCandidate>>,
    health: Arc<HealthStore>,
    prefix: PrefixRouter,
    rng: Mutex<StdRng>,
}

impl WeightedRouter {
    pub fn new(
        candidates: Vec<ModelCandidate>,
        health: Arc<HealthStore>,
        prefix: PrefixRouter,
    ) -> Self {
        Self {
            catalog: RwLock::new(candidates),
            health,
            prefix,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic variant for tests and reproducible simulations.
    pub fn with_seed(
        candidates: Vec<ModelCandidate>,
        health: Arc<HealthStore>,
        prefix: PrefixRouter,
        seed: u64,
    ) -> Self {
        Self {
            catalog: RwLock::new(candidates),
            health,
            prefix,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_config(config: &LlmConfig, health: Arc<HealthStore>) -> Self {
        Self::new(
            load_candidates(config),
            health,
            PrefixRouter::new(config.prefix_rules.clone()),
        )
    }

    /// Swap in a freshly loaded catalog.
    pub fn reload(&self, candidates: Vec<ModelCandidate>) {
        info!(count = candidates.len(), "catalog reloaded");
        *self.catalog.write() = candidates;
    }

    pub fn health(&self) -> &Arc<HealthStore> {
        &self.health
    }

    /// Select one candidate for the request.
    pub fn route(&self, request: &RouteRequest) -> Result<RouteResult, RouteError> {
        let catalog = self.catalog.read();

        // Fast path: an explicitly named model with a matching prefix rule
        // bypasses the scorer entirely.
        if let Some(preferred) = request.preferred_model.as_deref().filter(|m| !m.is_empty()) {
            if let Ok(provider) = self.prefix.route_by_model_id(preferred) {
                let candidate = catalog
                    .iter()
                    .filter(|c| c.enabled && c.provider == provider)
                    .find(|c| c.model_id == preferred || c.model_name == preferred)
                    .or_else(|| {
                        catalog.iter().find(|c| c.enabled && c.provider == provider)
                    });
                if let Some(candidate) = candidate {
                    debug!(model = %candidate.model_id, "fast-path prefix match");
                    return Ok(RouteResult {
                        provider: candidate.provider.clone(),
                        model_id: candidate.model_id.clone(),
                        model_name: candidate.model_name.clone(),
                        score: PREFIX_MATCH_SCORE,
                        reason: "prefix_match".to_string(),
                    });
                }
            }
        }

        let scored: Vec<(&ModelCandidate, f64)> = catalog
            .iter()
            .filter(|c| self.passes_filters(c, request))
            .map(|c| (c, self.score(c, request)))
            .collect();

        if scored.is_empty() {
            return Err(RouteError::NoAvailableModel);
        }

        let chosen = self.select_weighted(scored);
        debug!(model = %chosen.0.model_id, score = chosen.1, "weighted selection");
        Ok(RouteResult {
            provider: chosen.0.provider.clone(),
            model_id: chosen.0.model_id.clone(),
            model_name: chosen.0.model_name.clone(),
            score: chosen.1,
            reason: "weighted_score".to_string(),
        })
    }

    fn passes_filters(&self, candidate: &ModelCandidate, request: &RouteRequest) -> bool {
        if !candidate.enabled {
            return false;
        }

        let health = self.health.get(&candidate.model_id);

        if let Some(health) = &health {
            if !health.healthy {
                return false;
            }
            if let Some(cap) = latency_cap(candidate, request) {
                if has_latency_sample(health) && health.avg_latency_ms > cap as f64 {
                    return false;
                }
            }
            if let Some(min_rate) = candidate.sla.min_success_rate {
                if health.success_rate < min_rate {
                    return false;
                }
            }
        }

        if let Some(cap) = cost_cap(candidate, request) {
            if candidate.estimated_cost() > cap {
                return false;
            }
        }

        if !request.tags.is_empty() {
            let shares_tag = candidate
                .tags
                .iter()
                .any(|tag| request.tags.iter().any(|want| want == tag));
            if !shares_tag {
                return false;
            }
        }

        true
    }

    fn score(&self, candidate: &ModelCandidate, request: &RouteRequest) -> f64 {
        let mut score = candidate.weight;

        let price = candidate.input_price + candidate.output_price;
        score += 50.0 * candidate.cost_weight / (1.0 + 100.0 * price);

        match self.health.get(&candidate.model_id) {
            Some(health) if has_latency_sample(&health) => {
                score += 50.0 * candidate.latency_weight / (1.0 + health.avg_latency_ms / 1000.0);
                score += 100.0 * candidate.quality_weight * health.success_rate;
            }
            _ => score += NO_SAMPLE_BONUS,
        }

        if request.preferred_model.as_deref() == Some(candidate.model_name.as_str()) {
            score += PREFERRED_BONUS;
        }

        score
    }

    /// Weighted-random sampling over the scores. The score-to-probability
    /// mapping is unbounded: extreme weight skews can effectively starve
    /// low-weight candidates.
    fn select_weighted<'a>(
        &self,
        mut scored: Vec<(&'a ModelCandidate, f64)>,
    ) -> (&'a ModelCandidate, f64) {
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let total: f64 = scored.iter().map(|(_, s)| s.max(0.0)).sum();
        if !total.is_finite() || total <= 0.0 {
            return scored[0];
        }

        let target = self.rng.lock().gen_range(0.0..total);
        let mut cumulative = 0.0;
        for entry in &scored {
            cumulative += entry.1.max(0.0);
            if cumulative > target {
                return *entry;
            }
        }
        scored[0]
    }
}

fn has_latency_sample(health: &ModelHealth) -> bool {
    health.avg_latency_ms > 0.0
}

fn latency_cap(candidate: &ModelCandidate, request: &RouteRequest) -> Option<u64> {
    match (request.max_latency_ms, candidate.sla.max_latency_ms) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn cost_cap(candidate: &ModelCandidate, request: &RouteRequest) -> Option<f64> {
    match (request.max_cost, candidate.sla.max_cost_per_request) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
