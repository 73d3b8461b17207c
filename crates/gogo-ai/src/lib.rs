//! Streaming provider plumbing: SSE framing, provider adapters and tool-call reassembly.

mod abort;
mod accumulator;
mod error;
mod providers;
mod sse;
mod stream;
mod types;

pub use abort::{AbortController, AbortSignal};
pub use accumulator::{PendingToolCall, ToolCallAccumulator};
pub use error::{GogoError, GogoErrorCode};
pub use providers::common::{resolve_api_key, shared_http_client};
pub use providers::{
    adapter_for, AnthropicAdapter, GeminiAdapter, OpenAiResponsesAdapter, ProviderAdapter,
    ProviderAdapterRef, StreamDecoder,
};
pub use sse::{ChunkSource, EventReader};
pub use stream::stream_round;
pub use types::{
    Conversation, Model, ProviderKind, RoundOutput, StreamEffect, StreamOptions, ToolCall,
    ToolDeclaration, ToolExchange, ToolResult,
};
