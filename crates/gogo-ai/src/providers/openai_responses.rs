use std::collections::HashMap;

use reqwest::RequestBuilder;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::common::{join_url, parse_event, schema_or_default};
use super::{ProviderAdapter, StreamDecoder};
use crate::error::{GogoError, GogoErrorCode};
use crate::types::{
    Conversation, Model, ProviderKind, RoundOutput, StreamEffect, StreamOptions, ToolDeclaration,
    ToolExchange,
};

pub struct OpenAiResponsesAdapter;

impl ProviderAdapter for OpenAiResponsesAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn label(&self) -> &'static str {
        "OpenAI"
    }

    fn endpoint(&self, model: &Model) -> String {
        join_url(&model.base_url, "responses")
    }

    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {api_key}"))
    }

    fn build_tool_declarations(&self, tools: &[ToolDeclaration]) -> Value {
        Value::Array(
            tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": schema_or_default(&tool.parameters),
                    })
                })
                .collect(),
        )
    }

    fn initial_conversation(&self, prompt: &str) -> Conversation {
        Conversation {
            turns: vec![input_text_turn("user", prompt)],
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
        let mut input = Vec::with_capacity(conversation.turns.len() + 1);
        // A threaded response already carries the instruction from the first round.
        if conversation.previous_response_id.is_none() {
            if let Some(system_prompt) = options.system_prompt.as_deref() {
                input.push(input_text_turn("system", system_prompt));
            }
        }
        input.extend(conversation.turns.iter().cloned());

        let mut payload = json!({
            "model": model.id,
            "input": input,
            "stream": true,
        });
        if !tools.is_empty() {
            payload["tools"] = self.build_tool_declarations(tools);
            payload["tool_choice"] = json!("auto");
        }
        if let Some(max_tokens) = options.max_tokens {
            payload["max_output_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(previous) = &conversation.previous_response_id {
            payload["previous_response_id"] = json!(previous);
        }
        payload
    }

    fn build_continuation(
        &self,
        conversation: &Conversation,
        round: &RoundOutput,
        exchanges: &[ToolExchange],
    ) -> Conversation {
        let outputs = exchanges.iter().map(|exchange| {
            json!({
                "type": "function_call_output",
                "call_id": exchange.call.id,
                "output": exchange.result.to_json_string(),
            })
        });

        match &round.response_id {
            Some(response_id) => Conversation {
                turns: outputs.collect(),
                previous_response_id: Some(response_id.clone()),
            },
            None => {
                // Without a thread token the calls have to be replayed explicitly.
                let mut turns = conversation.turns.clone();
                if !round.text.is_empty() {
                    turns.push(json!({
                        "role": "assistant",
                        "content": [{ "type": "output_text", "text": round.text }],
                    }));
                }
                turns.extend(exchanges.iter().map(|exchange| {
                    json!({
                        "type": "function_call",
                        "call_id": exchange.call.id,
                        "name": exchange.call.name,
                        "arguments": exchange.call.arguments.to_string(),
                    })
                }));
                turns.extend(outputs);
                Conversation {
                    turns,
                    previous_response_id: conversation.previous_response_id.clone(),
                }
            }
        }
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<OpenAiResponsesDecoder>::default()
    }
}

fn input_text_turn(role: &str, text: &str) -> Value {
    json!({
        "role": role,
        "content": [{ "type": "input_text", "text": text }],
    })
}

/// Argument deltas reference the output item id; calls are keyed by `call_id`.
#[derive(Default)]
struct OpenAiResponsesDecoder {
    call_ids_by_item: HashMap<String, String>,
}

impl OpenAiResponsesDecoder {
    fn resolve_call_id(&self, event: &Value) -> Option<String> {
        if let Some(item_id) = event.get("item_id").and_then(Value::as_str) {
            if let Some(call_id) = self.call_ids_by_item.get(item_id) {
                return Some(call_id.clone());
            }
        }
        if let Some(call_id) = event.get("call_id").and_then(Value::as_str) {
            return Some(call_id.to_string());
        }
        if self.call_ids_by_item.len() == 1 {
            return self.call_ids_by_item.values().next().cloned();
        }
        None
    }
}

impl StreamDecoder for OpenAiResponsesDecoder {
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEffect>, GogoError> {
        if payload == "[DONE]" {
            return Ok(Vec::new());
        }

        let event = parse_event("OpenAI", payload)?;
        let Some(event_type) = event.get("type").and_then(Value::as_str) else {
            return Ok(Vec::new());
        };

        let mut effects = Vec::new();
        match event_type {
            "response.created" => {
                if let Some(id) = event
                    .get("response")
                    .and_then(|response| response.get("id"))
                    .and_then(Value::as_str)
                {
                    effects.push(StreamEffect::ResponseIdentifier(id.to_string()));
                }
            }
            "response.output_text.delta" => {
                if let Some(delta) = event.get("delta").and_then(Value::as_str) {
                    if !delta.is_empty() {
                        effects.push(StreamEffect::TextDelta(delta.to_string()));
                    }
                }
            }
            "response.output_item.added" => {
                let Some(item) = event.get("item").and_then(Value::as_object) else {
                    return Ok(effects);
                };
                if item.get("type").and_then(Value::as_str) != Some("function_call") {
                    return Ok(effects);
                }
                let item_id = item.get("id").and_then(Value::as_str).unwrap_or_default();
                let call_id = item
                    .get("call_id")
                    .and_then(Value::as_str)
                    .filter(|call_id| !call_id.is_empty())
                    .unwrap_or(item_id);
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                if call_id.is_empty() || name.is_empty() {
                    debug!(item_id, "function_call item without call id or name skipped");
                    return Ok(effects);
                }
                if !item_id.is_empty() {
                    self.call_ids_by_item
                        .insert(item_id.to_string(), call_id.to_string());
                }
                effects.push(StreamEffect::ToolCallStarted {
                    call_id: call_id.to_string(),
                    name: name.to_string(),
                });
                if let Some(arguments) = item.get("arguments").and_then(Value::as_str) {
                    if !arguments.is_empty() {
                        effects.push(StreamEffect::ToolArgFragment {
                            call_id: call_id.to_string(),
                            chunk: arguments.to_string(),
                        });
                    }
                }
            }
            "response.function_call_arguments.delta" => {
                let Some(delta) = event.get("delta").and_then(Value::as_str) else {
                    return Ok(effects);
                };
                match self.resolve_call_id(&event) {
                    Some(call_id) => effects.push(StreamEffect::ToolArgFragment {
                        call_id,
                        chunk: delta.to_string(),
                    }),
                    None => warn!("argument delta without a matching function_call item"),
                }
            }
            "error" => {
                let message = event
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        event
                            .get("error")
                            .and_then(|error| error.get("message"))
                            .and_then(Value::as_str)
                    })
                    .unwrap_or("unknown error");
                return Err(GogoError::new(
                    GogoErrorCode::ProviderProtocol,
                    format!("OpenAI stream error: {message}"),
                )
                .with_details(event.clone()));
            }
            "response.failed" => {
                let message = event
                    .get("response")
                    .and_then(|response| response.get("error"))
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("response failed");
                return Err(GogoError::new(
                    GogoErrorCode::ProviderProtocol,
                    format!("OpenAI stream error: {message}"),
                ));
            }
            _ => {}
        }

        Ok(effects)
    }
}
