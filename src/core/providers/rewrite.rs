//! Request-rewriter pipeline
//!
//! An ordered list of rewriters runs before every wire-codec call, for
//! unary and streaming paths alike. A rewriter may mutate the request or
//! reject it; rejection short-circuits the pipeline and surfaces as an
//! InvalidRequest carrying the rewriter's reason.

use crate::core::providers::ProviderError;
use crate::core::providers::profile::VendorProfile;
use crate::core::types::chat::ChatRequest;
use crate::core::types::message::MessageRole;

/// A pre-dispatch transformation on a canonical request.
pub trait RequestRewriter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mutate or reject the request. The returned string is the rejection
    /// reason shown to the caller.
    fn rewrite(&self, request: &mut ChatRequest) -> Result<(), String>;
}

/// Ordered rewriter pipeline. Order is preserved; the first failure wins.
pub struct RewritePipeline {
    rewriters: Vec<Box<dyn RequestRewriter>>,
}

impl std::fmt::Debug for RewritePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.rewriters.iter().map(|r| r.name()).collect();
        f.debug_struct("RewritePipeline").field("rewriters", &names).finish()
    }
}

impl RewritePipeline {
    pub fn new(rewriters: Vec<Box<dyn RequestRewriter>>) -> Self {
        Self { rewriters }
    }

    /// The built-in pipeline every provider runs: field validation, empty
    /// tool-list scrubbing, reasoning-mode model switching.
    pub fn standard(profile: &'static VendorProfile) -> Self {
        let mut rewriters: Vec<Box<dyn RequestRewriter>> = vec![
            Box::new(ValidateMessages),
            Box::new(ScrubEmptyTools),
        ];
        if let Some(hook) = profile.reasoning_hook {
            rewriters.push(Box::new(ReasoningModelSwitch { hook }));
        }
        Self { rewriters }
    }

    /// Run all rewriters in order against the request.
    pub fn apply(&self, provider: &str, request: &mut ChatRequest) -> Result<(), ProviderError> {
        for rewriter in &self.rewriters {
            rewriter.rewrite(request).map_err(|reason| {
                ProviderError::invalid_request(
                    provider,
                    format!("request rewrite failed: {reason}"),
                )
            })?;
        }
        Ok(())
    }
}

/// Rejects requests that violate the message invariants.
pub struct ValidateMessages;

impl RequestRewriter for ValidateMessages {
    fn name(&self) -> &'static str {
        "validate_messages"
    }

    fn rewrite(&self, request: &mut ChatRequest) -> Result<(), String> {
        if request.messages.is_empty() {
            return Err("messages must not be empty".to_string());
        }

        // tool calls issued so far, and the subset still unanswered
        let mut known: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut pending: std::collections::HashSet<&str> = std::collections::HashSet::new();

        for (i, message) in request.messages.iter().enumerate() {
            match message.role {
                MessageRole::Tool => {
                    let id = message.tool_call_id.as_deref().unwrap_or("");
                    if id.is_empty() {
                        return Err(format!("message {i}: tool message missing tool_call_id"));
                    }
                    if !known.contains(id) {
                        return Err(format!(
                            "message {i}: tool_call_id '{id}' does not reference a prior assistant tool call"
                        ));
                    }
                    pending.remove(id);
                }
                MessageRole::Assistant => {
                    if message.tool_call_id.is_some() {
                        return Err(format!(
                            "message {i}: tool_call_id is only valid on tool messages"
                        ));
                    }
                    if let Some(calls) = &message.tool_calls {
                        for call in calls {
                            known.insert(call.id.as_str());
                            pending.insert(call.id.as_str());
                        }
                    }
                }
                MessageRole::User => {
                    if message.tool_call_id.is_some() {
                        return Err(format!(
                            "message {i}: tool_call_id is only valid on tool messages"
                        ));
                    }
                    if !pending.is_empty() {
                        return Err(format!(
                            "message {i}: user turn before all pending tool calls are answered"
                        ));
                    }
                }
                MessageRole::System => {
                    if message.tool_call_id.is_some() {
                        return Err(format!(
                            "message {i}: tool_call_id is only valid on tool messages"
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Drops `tools: []`. Several upstreams reject an empty tool list outright.
pub struct ScrubEmptyTools;

impl RequestRewriter for ScrubEmptyTools {
    fn name(&self) -> &'static str {
        "scrub_empty_tools"
    }

    fn rewrite(&self, request: &mut ChatRequest) -> Result<(), String> {
        if request.tools.as_ref().is_some_and(|t| t.is_empty()) {
            request.tools = None;
            request.tool_choice = None;
        }
        Ok(())
    }
}

/// Applies the vendor's reasoning-mode model remap when the request does
/// not pin a model itself.
pub struct ReasoningModelSwitch {
    pub hook: super::profile::ReasoningHook,
}

impl RequestRewriter for ReasoningModelSwitch {
    fn name(&self) -> &'static str {
        "reasoning_model_switch"
    }

    fn rewrite(&self, request: &mut ChatRequest) -> Result<(), String> {
        if !request.model.is_empty() {
            return Ok(());
        }
        if let Some(mode) = request.reasoning {
            if let Some(model) = (self.hook)(mode) {
                request.model = model.to_string();
            }
        }
        Ok(())
    }
}
