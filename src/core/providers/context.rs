//! Ambient request context
//!
//! Carried through every provider call. Holds caller identity for routing
//! and observability, the cooperative cancellation token, and an optional
//! per-call API key override. Codecs consult the override at serialization
//! time on every request, never at provider construction.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Execution context for one dispatch-plane call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier for tracing
    pub request_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub tenant_id: Option<String>,
    pub trace_id: Option<String>,
    /// Per-call HTTP deadline; the provider-configured timeout applies when absent
    pub timeout: Option<Duration>,
    api_key_override: Option<String>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user_id: None,
            session_id: None,
            tenant_id: None,
            trace_id: None,
            timeout: None,
            api_key_override: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the provider-configured API key for this call only.
    pub fn with_api_key_override(mut self, key: impl Into<String>) -> Self {
        self.api_key_override = Some(key.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Effective per-call key override, trimmed. Whitespace-only overrides
    /// are ignored and fall through to the provider-configured key.
    pub fn api_key_override(&self) -> Option<&str> {
        self.api_key_override
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel every operation attached to this context.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_is_trimmed() {
        let ctx = RequestContext::new().with_api_key_override("  sk-test  ");
        assert_eq!(ctx.api_key_override(), Some("sk-test"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let ctx = RequestContext::new().with_api_key_override("   ");
        assert_eq!(ctx.api_key_override(), None);
        let ctx = RequestContext::new();
        assert_eq!(ctx.api_key_override(), None);
    }

    #[test]
    fn cancel_propagates() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
    }
}
