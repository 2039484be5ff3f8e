//! Prefix router
//!
//! Longest-prefix match from a model id to a provider code. Rule sets are
//! small (dozens), so a sorted linear scan is the whole algorithm.

use crate::core::router::error::RouteError;
use crate::core::types::config::PrefixRule;

/// Ordered prefix rules, longest first.
#[derive(Debug, Clone, Default)]
pub struct PrefixRouter {
    rules: Vec<PrefixRule>,
}

impl PrefixRouter {
    /// Build from rules; sorts by decreasing prefix length so the most
    /// specific rule wins.
    pub fn new(mut rules: Vec<PrefixRule>) -> Self {
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose prefix matches the model id, case-sensitively.
    pub fn route_by_model_id(&self, model_id: &str) -> Result<&str, RouteError> {
        if model_id.is_empty() {
            return Err(RouteError::NotFound(model_id.to_string()));
        }
        self.rules
            .iter()
            .find(|rule| model_id.starts_with(&rule.prefix))
            .map(|rule| rule.provider.as_str())
            .ok_or_else(|| RouteError::NotFound(model_id.to_string()))
    }
}
