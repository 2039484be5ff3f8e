//! A/B test router
//!
//! A provider-shaped decorator that splits traffic across N variants, each
//! itself a provider. Sticky routing pins a caller to one variant via a
//! SHA-256 hash of the configured key; otherwise selection is weighted
//! random. Variants must not point back at their enclosing router.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::core::providers::context::RequestContext;
use crate::core::providers::error::ProviderError;
use crate::core::providers::{ChunkStream, LlmProvider};
use crate::core::router::error::RouteError;
use crate::core::types::chat::{ChatRequest, ChatResponse, ModelInfo};
use crate::core::types::health::ProbeReport;

/// Cost placeholder applied per token when no pricing is wired in.
const COST_PER_TOKEN: f64 = 0.000_01;

/// Which request key pins sticky routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyKeySelector {
    UserId,
    SessionId,
    TenantId,
}

/// One experiment arm.
pub struct AbVariant {
    pub name: String,
    pub provider: Arc<dyn LlmProvider>,
    /// Traffic share, 0-100; all variants sum to exactly 100
    pub weight: u8,
    pub metadata: HashMap<String, String>,
}

impl AbVariant {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LlmProvider>, weight: u8) -> Self {
        Self {
            name: name.into(),
            provider,
            weight,
            metadata: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for AbVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbVariant")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Experiment configuration.
#[derive(Debug)]
pub struct AbTestConfig {
    pub experiment: String,
    pub variants: Vec<AbVariant>,
    pub sticky_routing: bool,
    pub sticky_key: StickyKeySelector,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AbTestConfig {
    pub fn new(experiment: impl Into<String>, variants: Vec<AbVariant>) -> Self {
        Self {
            experiment: experiment.into(),
            variants,
            sticky_routing: false,
            sticky_key: StickyKeySelector::UserId,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_sticky(mut self, selector: StickyKeySelector) -> Self {
        self.sticky_routing = true;
        self.sticky_key = selector;
        self
    }

    pub fn with_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }
}

/// Per-variant counters. Totals are atomic; float aggregates sit behind a
/// mutex.
#[derive(Debug, Default)]
pub struct VariantMetrics {
    total_requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    aggregates: Mutex<MetricAggregates>,
}

#[derive(Debug, Default)]
struct MetricAggregates {
    total_latency_ms: f64,
    total_cost: f64,
    quality_scores: Vec<f64>,
}

impl VariantMetrics {
    fn record_success(&self, latency_ms: f64, total_tokens: u32) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
        let mut agg = self.aggregates.lock();
        agg.total_latency_ms += latency_ms;
        agg.total_cost += f64::from(total_tokens) * COST_PER_TOKEN;
    }

    fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_quality(&self, score: f64) {
        self.aggregates.lock().quality_scores.push(score);
    }

    fn snapshot(&self, name: &str) -> VariantMetricsSnapshot {
        let agg = self.aggregates.lock();
        let successes = self.successes.load(Ordering::Relaxed);
        let quality = if agg.quality_scores.is_empty() {
            None
        } else {
            Some(agg.quality_scores.iter().sum::<f64>() / agg.quality_scores.len() as f64)
        };
        VariantMetricsSnapshot {
            variant: name.to_string(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successes,
            failures: self.failures.load(Ordering::Relaxed),
            avg_latency_ms: if successes == 0 {
                0.0
            } else {
                agg.total_latency_ms / successes as f64
            },
            total_cost: agg.total_cost,
            avg_quality: quality,
        }
    }
}

/// Point-in-time view of one variant's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantMetricsSnapshot {
    pub variant: String,
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
    pub total_cost: f64,
    pub avg_quality: Option<f64>,
}

/// Dynamic weights plus sticky assignments. One lock covers both so a
/// weight update and its cache invalidation are a single critical section.
#[derive(Debug)]
struct AbState {
    weights: Vec<u8>,
    sticky: HashMap<String, usize>,
}

/// Provider-shaped traffic splitter.
pub struct AbTestRouter {
    experiment: String,
    variants: Vec<AbVariant>,
    sticky_routing: bool,
    sticky_key: StickyKeySelector,
    end_time: Option<DateTime<Utc>>,
    state: RwLock<AbState>,
    metrics: Vec<VariantMetrics>,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for AbTestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbTestRouter")
            .field("experiment", &self.experiment)
            .field("variants", &self.variants)
            .field("sticky_routing", &self.sticky_routing)
            .finish()
    }
}

impl AbTestRouter {
    pub fn new(config: AbTestConfig) -> Result<Self, RouteError> {
        if config.variants.is_empty() {
            return Err(RouteError::InvalidAbConfig(
                "at least one variant is required".to_string(),
            ));
        }
        let sum: u32 = config.variants.iter().map(|v| u32::from(v.weight)).sum();
        if sum != 100 {
            return Err(RouteError::InvalidAbConfig(format!(
                "variant weights must sum to 100, got {sum}"
            )));
        }

        let weights = config.variants.iter().map(|v| v.weight).collect();
        let metrics = config
            .variants
            .iter()
            .map(|_| VariantMetrics::default())
            .collect();
        info!(
            experiment = %config.experiment,
            variants = config.variants.len(),
            sticky = config.sticky_routing,
            "A/B experiment started"
        );
        Ok(Self {
            experiment: config.experiment,
            variants: config.variants,
            sticky_routing: config.sticky_routing,
            sticky_key: config.sticky_key,
            end_time: config.end_time,
            state: RwLock::new(AbState {
                weights,
                sticky: HashMap::new(),
            }),
            metrics,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Deterministic variant for tests.
    pub fn with_seed(config: AbTestConfig, seed: u64) -> Result<Self, RouteError> {
        let mut router = Self::new(config)?;
        router.rng = Mutex::new(StdRng::seed_from_u64(seed));
        Ok(router)
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Replace the traffic split. The new weights must cover every variant
    /// and sum to exactly 100. Sticky assignments are dropped in the same
    /// critical section as the swap.
    pub fn update_weights(&self, weights: &HashMap<String, u8>) -> Result<(), RouteError> {
        let mut ordered = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            let weight = weights.get(&variant.name).ok_or_else(|| {
                RouteError::InvalidAbConfig(format!("missing weight for variant '{}'", variant.name))
            })?;
            ordered.push(*weight);
        }
        let sum: u32 = ordered.iter().map(|w| u32::from(*w)).sum();
        if sum != 100 {
            return Err(RouteError::InvalidAbConfig(format!(
                "variant weights must sum to 100, got {sum}"
            )));
        }

        let mut state = self.state.write();
        state.weights = ordered;
        if self.sticky_routing {
            state.sticky.clear();
        }
        info!(experiment = %self.experiment, "A/B weights updated, sticky cache cleared");
        Ok(())
    }

    /// Number of live sticky assignments.
    pub fn sticky_len(&self) -> usize {
        self.state.read().sticky.len()
    }

    pub fn metrics(&self) -> Vec<VariantMetricsSnapshot> {
        self.variants
            .iter()
            .zip(&self.metrics)
            .map(|(variant, metrics)| metrics.snapshot(&variant.name))
            .collect()
    }

    /// Attach an offline quality score to a variant.
    pub fn record_quality(&self, variant: &str, score: f64) {
        if let Some(position) = self.variants.iter().position(|v| v.name == variant) {
            self.metrics[position].record_quality(score);
        }
    }

    fn sticky_key_for(&self, context: &RequestContext) -> Option<String> {
        match self.sticky_key {
            StickyKeySelector::UserId => context.user_id.clone(),
            StickyKeySelector::SessionId => context.session_id.clone(),
            StickyKeySelector::TenantId => context.tenant_id.clone(),
        }
    }

    fn select_variant(&self, context: &RequestContext) -> usize {
        // past the experiment window every request pins to control
        if let Some(end) = self.end_time {
            if Utc::now() > end {
                return 0;
            }
        }

        if self.sticky_routing {
            if let Some(key) = self.sticky_key_for(context) {
                if let Some(&index) = self.state.read().sticky.get(&key) {
                    return index;
                }
                let bucket = hash_bucket(&key);
                let index = {
                    let state = self.state.read();
                    index_for_bucket(bucket, &state.weights)
                };
                self.state.write().sticky.insert(key, index);
                debug!(experiment = %self.experiment, variant = index, "sticky assignment");
                return index;
            }
            warn!(
                experiment = %self.experiment,
                "sticky routing enabled but sticky key absent, falling back to weighted random"
            );
        }

        let draw = self.rng.lock().gen_range(0..100u32);
        let state = self.state.read();
        index_for_bucket(draw, &state.weights)
    }
}

/// Deterministic bucket in [0, 100) for a sticky key.
fn hash_bucket(key: &str) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u32
}

/// Step through cumulative weights until the bucket falls inside one.
fn index_for_bucket(bucket: u32, weights: &[u8]) -> usize {
    let mut cumulative = 0u32;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += u32::from(*weight);
        if bucket < cumulative {
            return index;
        }
    }
    weights.len().saturating_sub(1)
}

#[async_trait]
impl LlmProvider for AbTestRouter {
    fn name(&self) -> &str {
        &self.experiment
    }

    /// AND over the variants: the experiment only advertises native tool
    /// calling when every arm can do it.
    fn supports_native_function_calling(&self) -> bool {
        self.variants
            .iter()
            .all(|v| v.provider.supports_native_function_calling())
    }

    async fn chat_completion(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let index = self.select_variant(&context);
        let variant = &self.variants[index];
        let started = Instant::now();

        match variant.provider.chat_completion(request, context).await {
            Ok(mut response) => {
                let total_tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);
                self.metrics[index]
                    .record_success(started.elapsed().as_millis() as f64, total_tokens);
                // suffix the label so downstream accounting can tell arms apart
                response.provider = format!("{}[{}]", response.provider, variant.name);
                Ok(response)
            }
            Err(err) => {
                self.metrics[index].record_failure();
                Err(err)
            }
        }
    }

    async fn chat_completion_stream(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        let index = self.select_variant(&context);
        let variant = &self.variants[index];
        match variant.provider.chat_completion_stream(request, context).await {
            Ok(stream) => {
                self.metrics[index].record_success(0.0, 0);
                Ok(stream)
            }
            Err(err) => {
                self.metrics[index].record_failure();
                Err(err)
            }
        }
    }

    /// Healthy only when ALL variants are healthy.
    async fn health_check(&self) -> ProbeReport {
        let probes =
            futures::future::join_all(self.variants.iter().map(|v| v.provider.health_check()))
                .await;
        let healthy = probes.iter().all(|p| p.healthy);
        let latency_ms = probes.iter().map(|p| p.latency_ms).max().unwrap_or(0);
        let error_rate = probes
            .iter()
            .map(|p| p.error_rate)
            .fold(0.0_f64, f64::max);
        let error = probes.iter().rev().find_map(|p| p.error.clone());
        ProbeReport {
            healthy,
            latency_ms,
            error_rate,
            error: if healthy { None } else { error },
        }
    }

    /// Union of the variants' model lists, deduplicated and sorted by id.
    /// Per-variant failures are suppressed; only an empty union surfaces
    /// the last error.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let mut merged: Vec<ModelInfo> = Vec::new();
        let mut last_error = None;
        for variant in &self.variants {
            match variant.provider.list_models().await {
                Ok(models) => {
                    for model in models {
                        if !merged.iter().any(|m| m.id == model.id) {
                            merged.push(model);
                        }
                    }
                }
                Err(err) => {
                    warn!(variant = %variant.name, error = %err, "list_models failed");
                    last_error = Some(err);
                }
            }
        }
        if merged.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        merged.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(merged)
    }
}
