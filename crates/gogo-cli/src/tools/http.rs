use std::sync::Arc;

use async_trait::async_trait;
use gogo_agent_core::{AgentTool, ToolDefinition, ToolExecutor};
use gogo_ai::{shared_http_client, ToolResult};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use super::common::{argument_map, output_value};
use super::template::{expand_env, substitute_template};

pub fn create_http_tool(definition: ToolDefinition) -> AgentTool {
    let executor = HttpToolExecutor {
        definition: definition.clone(),
    };
    AgentTool::new(definition, Arc::new(executor))
}

struct HttpToolExecutor {
    definition: ToolDefinition,
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, arguments: Value) -> ToolResult {
        match argument_map(&arguments) {
            Ok(params) => execute_http(&self.definition, &params).await,
            Err(result) => result,
        }
    }
}

/// Body and method an HTTP tool would send for the given arguments.
pub(crate) fn request_body(definition: &ToolDefinition, params: &Map<String, Value>) -> Option<String> {
    match definition.body.as_deref().filter(|body| !body.is_empty()) {
        Some(template) => Some(substitute_template(template, params)),
        None if !params.is_empty() => Some(Value::Object(params.clone()).to_string()),
        None => None,
    }
}

pub(crate) fn request_method(definition: &ToolDefinition, has_body: bool) -> Result<Method, String> {
    match definition.method.as_deref().map(str::trim).filter(|method| !method.is_empty()) {
        Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|error| format!("invalid input: bad method '{method}': {error}")),
        None if has_body => Ok(Method::POST),
        None => Ok(Method::GET),
    }
}

async fn execute_http(definition: &ToolDefinition, params: &Map<String, Value>) -> ToolResult {
    let url = substitute_template(definition.url.as_deref().unwrap_or_default(), params);
    let body = request_body(definition, params);
    let method = match request_method(definition, body.is_some()) {
        Ok(method) => method,
        Err(error) => return ToolResult::failure(error),
    };

    let client = shared_http_client(&url);
    let mut request = client
        .request(method.clone(), url.as_str())
        .timeout(definition.timeout());
    let mut has_content_type = false;
    for (name, value) in &definition.headers {
        has_content_type |= name.eq_ignore_ascii_case("content-type");
        request = request.header(name.as_str(), expand_env(&substitute_template(value, params)));
    }
    if let Some(body) = body {
        if !has_content_type {
            request = request.header("Content-Type", "application/json");
        }
        request = request.body(body);
    }

    debug!(tool_name = definition.name.as_str(), method = %method, url = url.as_str(), "http tool request");
    let response = match request.send().await {
        Ok(response) => response,
        Err(error) => return ToolResult::failure(format!("request failed: {error}")),
    };
    let status = response.status();
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(error) => return ToolResult::failure(format!("failed to read response: {error}")),
    };

    if status.as_u16() >= 400 {
        return ToolResult::failure(format!(
            "HTTP {}: {}",
            status.as_u16(),
            String::from_utf8_lossy(&bytes)
        ));
    }
    ToolResult::success(output_value(&bytes))
}
