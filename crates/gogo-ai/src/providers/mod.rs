use std::sync::Arc;

use reqwest::RequestBuilder;
use serde_json::Value;

use crate::error::GogoError;
use crate::types::{
    Conversation, Model, ProviderKind, RoundOutput, StreamEffect, StreamOptions, ToolDeclaration,
    ToolExchange,
};

mod anthropic;
pub(crate) mod common;
mod google_generative_ai;
mod openai_responses;

pub use anthropic::AnthropicAdapter;
pub use google_generative_ai::GeminiAdapter;
pub use openai_responses::OpenAiResponsesAdapter;

/// Wire-format knowledge for one remote service.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Human-facing service name used in error messages.
    fn label(&self) -> &'static str;

    fn endpoint(&self, model: &Model) -> String;

    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder;

    fn build_tool_declarations(&self, tools: &[ToolDeclaration]) -> Value;

    fn initial_conversation(&self, prompt: &str) -> Conversation;

    fn build_request(
        &self,
        model: &Model,
        conversation: &Conversation,
        tools: &[ToolDeclaration],
        options: &StreamOptions,
    ) -> Value;

    /// Conversation for the round that carries tool results back.
    fn build_continuation(
        &self,
        conversation: &Conversation,
        round: &RoundOutput,
        exchanges: &[ToolExchange],
    ) -> Conversation;

    /// Fresh decoder; decoders hold per-round state and are never reused.
    fn decoder(&self) -> Box<dyn StreamDecoder>;
}

pub trait StreamDecoder: Send {
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEffect>, GogoError>;
}

pub type ProviderAdapterRef = Arc<dyn ProviderAdapter>;

pub fn adapter_for(kind: ProviderKind) -> ProviderAdapterRef {
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiResponsesAdapter),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter),
        ProviderKind::Gemini => Arc::new(GeminiAdapter),
    }
}
