use reqwest::RequestBuilder;
use serde_json::{json, Map, Value};

use super::common::{join_url, parse_event, schema_or_default};
use super::{ProviderAdapter, StreamDecoder};
use crate::error::{GogoError, GogoErrorCode};
use crate::types::{
    Conversation, Model, ProviderKind, RoundOutput, StreamEffect, StreamOptions, ToolCall,
    ToolDeclaration, ToolExchange,
};

const GENERATED_CALL_ID_PREFIX: &str = "gemini_call_";

pub struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn label(&self) -> &'static str {
        "Gemini"
    }

    fn endpoint(&self, model: &Model) -> String {
        let model_id = model.id.trim().trim_start_matches('/');
        let model_id = model_id.strip_prefix("models/").unwrap_or(model_id);
        join_url(
            &model.base_url,
            &format!("models/{model_id}:streamGenerateContent?alt=sse"),
        )
    }

    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        request.header("x-goog-api-key", api_key)
    }

    fn build_tool_declarations(&self, tools: &[ToolDeclaration]) -> Value {
        json!([{
            "functionDeclarations": tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": schema_or_default(&tool.parameters),
                    })
                })
                .collect::<Vec<_>>()
        }])
    }

    fn initial_conversation(&self, prompt: &str) -> Conversation {
        Conversation {
            turns: vec![json!({ "role": "user", "parts": [{ "text": prompt }] })],
            previous_response_id: None,
        }
    }

    fn build_request(
        &self,
        _model: &Model,
        conversation: &Conversation,
        tools: &[ToolDeclaration],
        options: &StreamOptions,
    ) -> Value {
        let mut payload = json!({ "contents": conversation.turns });

        if let Some(system_prompt) = &options.system_prompt {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system_prompt }] });
        }
        if !tools.is_empty() {
            payload["tools"] = self.build_tool_declarations(tools);
        }

        let mut generation_config = Map::new();
        if let Some(temperature) = options.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            payload["generationConfig"] = Value::Object(generation_config);
        }

        payload
    }

    fn build_continuation(
        &self,
        conversation: &Conversation,
        round: &RoundOutput,
        exchanges: &[ToolExchange],
    ) -> Conversation {
        let mut model_parts = Vec::with_capacity(exchanges.len() + 1);
        if !round.text.is_empty() {
            model_parts.push(json!({ "text": round.text }));
        }
        model_parts.extend(exchanges.iter().map(|exchange| {
            let mut function_call = json!({
                "name": exchange.call.name,
                "args": exchange.call.arguments,
            });
            if let Some(id) = provider_call_id(&exchange.call) {
                function_call["id"] = json!(id);
            }
            json!({ "functionCall": function_call })
        }));

        let response_parts = exchanges
            .iter()
            .map(|exchange| {
                let mut function_response = json!({
                    "name": exchange.call.name,
                    "response": { "result": exchange.result.to_json_value() },
                });
                if let Some(id) = provider_call_id(&exchange.call) {
                    function_response["id"] = json!(id);
                }
                json!({ "functionResponse": function_response })
            })
            .collect::<Vec<_>>();

        let mut turns = conversation.turns.clone();
        turns.push(json!({ "role": "model", "parts": model_parts }));
        turns.push(json!({ "role": "user", "parts": response_parts }));
        Conversation {
            turns,
            previous_response_id: None,
        }
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<GeminiDecoder>::default()
    }
}

/// Ids Gemini sent itself; minted ids never go back on the wire.
fn provider_call_id(call: &ToolCall) -> Option<&str> {
    Some(call.id.as_str()).filter(|id| !id.starts_with(GENERATED_CALL_ID_PREFIX))
}

/// Function calls arrive whole and usually without ids, so ids are minted per round.
#[derive(Default)]
struct GeminiDecoder {
    calls_seen: usize,
}

impl StreamDecoder for GeminiDecoder {
    fn decode(&mut self, payload: &str) -> Result<Vec<StreamEffect>, GogoError> {
        let event = parse_event("Gemini", payload)?;

        if let Some(error) = event.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(GogoError::new(
                GogoErrorCode::ProviderProtocol,
                format!("Gemini stream error: {message}"),
            )
            .with_details(error.clone()));
        }

        let mut effects = Vec::new();
        let parts = event
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array);
        let Some(parts) = parts else {
            return Ok(effects);
        };

        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    effects.push(StreamEffect::TextDelta(text.to_string()));
                }
            }

            let Some(function_call) = part.get("functionCall").and_then(Value::as_object) else {
                continue;
            };
            let name = function_call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            self.calls_seen += 1;
            let call_id = function_call
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{GENERATED_CALL_ID_PREFIX}{}", self.calls_seen));
            let arguments = function_call
                .get("args")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));

            effects.push(StreamEffect::ToolCallStarted {
                call_id: call_id.clone(),
                name: name.to_string(),
            });
            effects.push(StreamEffect::ToolArgFragment {
                call_id,
                chunk: arguments.to_string(),
            });
        }

        Ok(effects)
    }
}
