use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::{StreamEffect, ToolCall};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Reassembles streamed argument fragments into complete calls for one round.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    order: Vec<String>,
    pending: HashMap<String, PendingToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one effect; effects that are not tool-call related are ignored.
    pub fn apply(&mut self, effect: &StreamEffect) {
        match effect {
            StreamEffect::ToolCallStarted { call_id, name } => self.start(call_id, name),
            StreamEffect::ToolArgFragment { call_id, chunk } => self.append(call_id, chunk),
            StreamEffect::TextDelta(_) | StreamEffect::ResponseIdentifier(_) => {}
        }
    }

    pub fn start(&mut self, call_id: &str, name: &str) {
        if self.pending.contains_key(call_id) {
            debug!(call_id, "duplicate tool call start ignored");
            return;
        }
        self.order.push(call_id.to_string());
        self.pending.insert(
            call_id.to_string(),
            PendingToolCall {
                call_id: call_id.to_string(),
                name: name.to_string(),
                arguments: String::new(),
            },
        );
    }

    pub fn append(&mut self, call_id: &str, chunk: &str) {
        match self.pending.get_mut(call_id) {
            Some(call) => call.arguments.push_str(chunk),
            None => debug!(call_id, "argument fragment for unknown tool call ignored"),
        }
    }

    pub fn pending(&self, call_id: &str) -> Option<&PendingToolCall> {
        self.pending.get(call_id)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Finalizes every call in start order. Calls whose arguments are not a JSON object are dropped.
    pub fn finish(mut self) -> Vec<ToolCall> {
        let mut calls = Vec::with_capacity(self.order.len());
        for call_id in self.order {
            let Some(pending) = self.pending.remove(&call_id) else {
                continue;
            };
            match parse_arguments(&pending.arguments) {
                Some(arguments) => calls.push(ToolCall {
                    id: pending.call_id,
                    name: pending.name,
                    arguments,
                    raw_arguments: pending.arguments,
                }),
                None => warn!(
                    call_id = pending.call_id.as_str(),
                    tool_name = pending.name.as_str(),
                    arguments = pending.arguments.as_str(),
                    "dropping tool call with malformed arguments"
                ),
            }
        }
        calls
    }
}

fn parse_arguments(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return Some(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.start("call_1", "fs");
        accumulator.append("call_1", r#"{"op":"list"#);
        accumulator.append("call_1", r#"","path":"/tmp"}"#);
        assert_eq!(
            accumulator.pending("call_1").map(|call| call.arguments.as_str()),
            Some(r#"{"op":"list","path":"/tmp"}"#)
        );

        let calls = accumulator.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({ "op": "list", "path": "/tmp" }));
        assert_eq!(calls[0].raw_arguments, r#"{"op":"list","path":"/tmp"}"#);
    }

    #[test]
    fn every_partition_of_a_string_reassembles_to_it() {
        let source = r#"{"op":"write","path":"a.txt","data":"héllo, wörld"}"#;
        let chars: Vec<char> = source.chars().collect();
        for split in 1..chars.len() {
            let (left, right): (String, String) = (
                chars[..split].iter().collect(),
                chars[split..].iter().collect(),
            );
            let mut accumulator = ToolCallAccumulator::new();
            accumulator.start("c", "fs");
            accumulator.append("c", &left);
            accumulator.append("c", &right);
            assert_eq!(
                accumulator.pending("c").map(|call| call.arguments.clone()),
                Some(source.to_string())
            );
        }
    }

    #[test]
    fn interleaved_calls_are_demultiplexed_and_keep_start_order() {
        let mut accumulator = ToolCallAccumulator::new();
        let effects = vec![
            StreamEffect::ToolCallStarted {
                call_id: "b".to_string(),
                name: "second".to_string(),
            },
            StreamEffect::ToolCallStarted {
                call_id: "a".to_string(),
                name: "first".to_string(),
            },
            StreamEffect::ToolArgFragment {
                call_id: "a".to_string(),
                chunk: r#"{"x":"#.to_string(),
            },
            StreamEffect::TextDelta("ignored".to_string()),
            StreamEffect::ToolArgFragment {
                call_id: "b".to_string(),
                chunk: r#"{"y":2}"#.to_string(),
            },
            StreamEffect::ToolArgFragment {
                call_id: "a".to_string(),
                chunk: "1}".to_string(),
            },
        ];
        for effect in &effects {
            accumulator.apply(effect);
        }

        let calls = accumulator.finish();
        let names: Vec<&str> = calls.iter().map(|call| call.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(calls[0].arguments, json!({ "y": 2 }));
        assert_eq!(calls[1].arguments, json!({ "x": 1 }));
    }

    #[test]
    fn malformed_or_non_object_arguments_drop_only_that_call() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.start("bad", "fs");
        accumulator.append("bad", r#"{"op":"#);
        accumulator.start("array", "fs");
        accumulator.append("array", "[1,2]");
        accumulator.start("good", "fs");
        accumulator.append("good", r#"{"op":"stat","path":"."}"#);

        let calls = accumulator.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "good");
    }

    #[test]
    fn empty_arguments_finalize_to_empty_object() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.start("c", "ping");
        assert_eq!(accumulator.finish()[0].arguments, json!({}));
    }

    #[test]
    fn fragments_for_unknown_calls_are_ignored() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.append("ghost", "{}");
        assert!(accumulator.is_empty());
        assert!(accumulator.finish().is_empty());
    }
}
