//! Tool-call fragment accumulation
//!
//! Tool-call arguments arrive scattered over many chunks, keyed by the
//! fragment index within the choice. Any prefix of the fragments may be
//! invalid JSON; the concatenation of all fragments for one index must
//! parse once the stream terminates.

use std::collections::BTreeMap;

use crate::core::providers::ProviderError;
use crate::core::types::streaming::ChatChunk;
use crate::core::types::tools::{ToolCall, ToolCallDelta};

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates tool-call fragments until the stream terminates.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    provider: String,
    slots: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            slots: BTreeMap::new(),
        }
    }

    /// Fold one fragment in. The first fragment at an index carries id and
    /// name; later fragments only append argument bytes.
    pub fn push(&mut self, delta: &ToolCallDelta) {
        let slot = self.slots.entry(delta.index).or_default();
        if slot.id.is_none() {
            slot.id = delta.id.clone();
        }
        if slot.name.is_none() {
            slot.name = delta.name.clone();
        }
        slot.arguments.push_str(&delta.arguments);
    }

    /// Fold in every tool-call fragment of a chunk.
    pub fn push_chunk(&mut self, chunk: &ChatChunk) {
        for choice in &chunk.choices {
            if let Some(deltas) = &choice.delta.tool_calls {
                for delta in deltas {
                    self.push(delta);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Assemble the completed calls, parsing each argument buffer as JSON.
    /// An unparseable buffer means the upstream truncated or corrupted the
    /// stream and surfaces as a retryable upstream error.
    pub fn finish(self) -> Result<Vec<ToolCall>, ProviderError> {
        let provider = self.provider;
        let mut calls = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots {
            let raw = if slot.arguments.is_empty() {
                "{}"
            } else {
                slot.arguments.as_str()
            };
            let arguments: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
                ProviderError::upstream(
                    provider.clone(),
                    502,
                    format!("tool call {index} arguments are not valid JSON: {e}"),
                )
            })?;
            calls.push(ToolCall {
                id: slot.id.unwrap_or_else(|| format!("call_{index}")),
                name: slot.name.unwrap_or_default(),
                arguments,
            });
        }
        Ok(calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.to_string(),
        }
    }

    #[test]
    fn concatenates_string_wrapped_fragments() {
        // fragments "{"a":, "1",, "b":2} reassemble to {"a":"1","b":2}
        let mut acc = ToolCallAccumulator::new("openai");
        acc.push(&fragment(0, Some("call_1"), Some("lookup"), "{\"a\":"));
        acc.push(&fragment(0, None, None, "\"1\","));
        acc.push(&fragment(0, None, None, "\"b\":2}"));

        let calls = acc.finish().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "lookup");
        assert_eq!(
            calls[0].arguments,
            serde_json::json!({"a": "1", "b": 2})
        );
    }

    #[test]
    fn interleaved_indices_accumulate_independently() {
        let mut acc = ToolCallAccumulator::new("openai");
        acc.push(&fragment(0, Some("a"), Some("first"), "{\"x\":"));
        acc.push(&fragment(1, Some("b"), Some("second"), "{\"y\":"));
        acc.push(&fragment(0, None, None, "1}"));
        acc.push(&fragment(1, None, None, "2}"));

        let calls = acc.finish().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, serde_json::json!({"x": 1}));
        assert_eq!(calls[1].arguments, serde_json::json!({"y": 2}));
    }

    #[test]
    fn invalid_concatenation_is_upstream_error() {
        let mut acc = ToolCallAccumulator::new("openai");
        acc.push(&fragment(0, Some("a"), Some("broken"), "{\"x\": oops"));
        let err = acc.finish().unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status: 502, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn empty_arguments_default_to_object() {
        let mut acc = ToolCallAccumulator::new("openai");
        acc.push(&fragment(0, Some("a"), Some("noop"), ""));
        let calls = acc.finish().unwrap();
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }
}
