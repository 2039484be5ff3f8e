//! Streaming support: SSE framing and tool-call accumulation

pub mod accumulator;
pub mod sse;

pub use accumulator::ToolCallAccumulator;
pub use sse::{SseDecoder, SseLine, is_done_marker};
