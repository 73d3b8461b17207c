use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gogo_ai::{ToolDeclaration, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Builtin,
    Http,
    Exec,
}

impl ToolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Http => "http",
            Self::Exec => "exec",
        }
    }
}

/// A tool as declared by the user or provided built in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            url: None,
            method: None,
            headers: BTreeMap::new(),
            body: None,
            command: None,
            args: Vec::new(),
            input_schema: None,
            timeout_ms: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("tool name is required".to_string());
        }
        match self.kind {
            ToolKind::Http if is_blank(self.url.as_deref()) => {
                Err(format!("http tool '{}' requires url", self.name))
            }
            ToolKind::Exec if is_blank(self.command.as_deref()) => {
                Err(format!("exec tool '{}' requires command", self.name))
            }
            _ => Ok(()),
        }
    }

    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            Some(millis) if millis > 0 => Duration::from_millis(millis),
            _ => DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self
                .input_schema
                .clone()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).unwrap_or_default().is_empty()
}

pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Runs a tool. Failures are reported through `ToolResult`, never raised.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: Value) -> ToolResult;
}

#[async_trait]
impl<F> ToolExecutor for F
where
    F: Fn(Value) -> ToolFuture + Send + Sync + 'static,
{
    async fn execute(&self, arguments: Value) -> ToolResult {
        (self)(arguments).await
    }
}

pub type ToolExecuteFn = Arc<dyn ToolExecutor>;

#[derive(Clone)]
pub struct AgentTool {
    pub definition: ToolDefinition,
    pub execute: ToolExecuteFn,
}

impl AgentTool {
    pub fn new(definition: ToolDefinition, execute: ToolExecuteFn) -> Self {
        Self {
            definition,
            execute,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}
