use std::collections::HashMap;

use reqwest::RequestBuilder;
use serde_json::{json, Value};
use tracing::debug;

use super::common::{join_url, parse_event, schema_or_default};
use super::{ProviderAdapter, StreamDecoder};
use crate::error::{GogoError, GogoErrorCode};
use crate::types::{
    Conversation, Model, ProviderKind, RoundOutput, StreamEffect, StreamOptions, ToolDeclaration,
    ToolExchange,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn label(&self) -> &'static str {
        "Anthropic"
    }

    fn endpoint(&self, model: &Model) -> String {
        join_url(&model.base_url, "messages")
    }

    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        request
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn build_tool_declarations(&self, tools: &[ToolDeclaration]) -> Value {
        Value::Array(
            tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": schema_or_default(&tool.parameters),
                    })
                })
                .collect(),
        )
    }

    fn initial_conversation(&self, prompt: &str) -> Conversation {
        Conversation {
            turns: vec![json!({ "role": "user", "content": prompt })],
            previous_response_id: None,
        }
    }

    fn build_request(
        &self,
        model: &Model,
        conversation: &Conversation,
        tools: &[ToolDeclaration],
        options: &StreamOptions,
    ) -> Value {
        let mut payload = json!({
            "model": model.id,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
            "messages": conversation.turns,
        });
        if let Some(system_prompt) = &options.system_prompt {
            payload["system"] = Value::String(system_prompt.clone());
        }
        if !tools.is_empty() {
            payload["tools"] = self.build_tool_declarations(tools);
        }
        if let Some(temperature) = options.temperature {
            payload["temperature"] = json!(temperature);
        }
        payload
    }

    fn build_continuation(
        &self,
        conversation: &Conversation,
        round: &RoundOutput,
        exchanges: &[ToolExchange],
    ) -> Conversation {
        let mut assistant_content = Vec::with_capacity(exchanges.len() + 1);
        if !round.text.is_empty() {
            assistant_content.push(json!({ "type": "text", "text": round.text }));
        }
        assistant_content.extend(exchanges.iter().map(|exchange| {
            json!({
                "type": "tool_use",
                "id": exchange.call.id,
                "name": exchange.call.name,
                "input": exchange.call.arguments,
            })
        }));

        let results = exchanges
            .iter()
            .map(|exchange| {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": exchange.call.id,
                    "content": [{
                        "type": "text",
                        "text": exchange.result.to_json_string(),
                    }],
                });
                if !exchange.result.ok {
                    block["is_error"] = Value::Bool(true);
                }
                block
            })
            .collect::<Vec<_>>();

        let mut turns = conversation.turns.clone();
        turns.push(json!({ "role": "assistant", "content": assistant_content }));
        turns.push(json!({ "role": "user", "content": results }));
        Conversation {
            turns,
            previous_response_id: None,
        }
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<AnthropicDecoder>::default()
    }
}

/// Tool blocks are announced with an index; later deltas only carry that index.
#[derive(Default)]
struct AnthropicDecoder {
    tool_blocks: HashMap<u64, String>,
    active_tool: Option<String>,
}

impl StreamDecoder for AnthropicDecoder {
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEffect>, GogoError> {
        let event = parse_event("Anthropic", payload)?;
        let Some(event_type) = event.get("type").and_then(Value::as_str) else {
            return Ok(Vec::new());
        };
        let index = event.get("index").and_then(Value::as_u64);

        let mut effects = Vec::new();
        match event_type {
            "content_block_start" => {
                let Some(block) = event.get("content_block") else {
                    return Ok(effects);
                };
                if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                    return Ok(effects);
                }
                let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                if id.is_empty() || name.is_empty() {
                    debug!(?index, "tool_use block without id or name skipped");
                    return Ok(effects);
                }
                if let Some(index) = index {
                    self.tool_blocks.insert(index, id.to_string());
                }
                self.active_tool = Some(id.to_string());
                effects.push(StreamEffect::ToolCallStarted {
                    call_id: id.to_string(),
                    name: name.to_string(),
                });
            }
            "content_block_delta" => {
                let Some(delta) = event.get("delta") else {
                    return Ok(effects);
                };
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                effects.push(StreamEffect::TextDelta(text.to_string()));
                            }
                        }
                    }
                    Some("input_json_delta") => {
                        let chunk = delta
                            .get("partial_json")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let call_id = index
                            .and_then(|index| self.tool_blocks.get(&index).cloned())
                            .or_else(|| self.active_tool.clone());
                        match call_id {
                            Some(call_id) if !chunk.is_empty() => {
                                effects.push(StreamEffect::ToolArgFragment {
                                    call_id,
                                    chunk: chunk.to_string(),
                                })
                            }
                            Some(_) => {}
                            None => debug!(?index, "input_json_delta without tool block"),
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(index) = index {
                    if self.tool_blocks.get(&index) == self.active_tool.as_ref() {
                        self.active_tool = None;
                    }
                }
            }
            "error" => {
                let message = event
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(GogoError::new(
                    GogoErrorCode::ProviderProtocol,
                    format!("Anthropic stream error: {message}"),
                )
                .with_details(event.clone()));
            }
            _ => {}
        }

        Ok(effects)
    }
}
