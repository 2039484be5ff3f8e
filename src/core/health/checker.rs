//! Background health checker
//!
//! Probes each provider once per tick and writes a fresh record for every
//! catalog model served by that provider. With no providers injected the
//! checker logs and skips; it never marks models healthy by default, so a
//! cold start cannot misroute traffic toward unprobed upstreams.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::providers::LlmProvider;
use crate::core::router::health_store::HealthStore;
use crate::core::types::config::HealthCheckSettings;
use crate::core::types::health::ModelHealth;
use crate::core::types::model::ModelCandidate;

/// Periodic prober feeding the shared health store.
pub struct HealthChecker {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    candidates: Vec<ModelCandidate>,
    store: Arc<HealthStore>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<HealthStore>, settings: &HealthCheckSettings) -> Self {
        Self {
            providers: HashMap::new(),
            candidates: Vec::new(),
            store,
            interval: settings.interval(),
            probe_timeout: settings.probe_timeout(),
        }
    }

    /// Register a provider under its provider code.
    pub fn register(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<ModelCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Run the loop until the token cancels. One probe per provider per
    /// tick; write-backs cover every candidate of the probed provider.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("health checker stopped");
                        return;
                    }
                    _ = ticker.tick() => self.check_once().await,
                }
            }
        })
    }

    /// One full probe round.
    pub async fn check_once(&self) {
        if self.providers.is_empty() {
            warn!("no providers registered, skipping health probe round");
            return;
        }

        let mut by_provider: HashMap<&str, Vec<&ModelCandidate>> = HashMap::new();
        for candidate in &self.candidates {
            by_provider
                .entry(candidate.provider.as_str())
                .or_default()
                .push(candidate);
        }

        for (code, provider) in &self.providers {
            let started = Instant::now();
            let probe = tokio::time::timeout(self.probe_timeout, provider.health_check()).await;
            let measured_ms = started.elapsed().as_millis() as u64;

            let (healthy, latency_ms, error) = match probe {
                Ok(report) => {
                    let latency = if report.latency_ms > 0 {
                        report.latency_ms
                    } else {
                        measured_ms
                    };
                    (report.healthy, latency, report.error)
                }
                Err(_) => (
                    false,
                    measured_ms,
                    Some(format!(
                        "health probe timed out after {:?}",
                        self.probe_timeout
                    )),
                ),
            };
            debug!(provider = %code, healthy, latency_ms, "probe finished");

            let models = by_provider.get(code.as_str()).cloned().unwrap_or_default();
            for candidate in models {
                let record = if healthy {
                    let mut record = ModelHealth::healthy(&candidate.model_id, latency_ms as f64);
                    record.success_rate = 1.0;
                    record
                } else {
                    let mut record = ModelHealth::unhealthy(
                        &candidate.model_id,
                        error.clone().unwrap_or_else(|| "probe failed".to_string()),
                    );
                    record.avg_latency_ms = latency_ms as f64;
                    record
                };
                self.store.set(record);
            }
        }
    }
}
