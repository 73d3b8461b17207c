mod common;
mod exec;
mod fs;
mod http;
mod template;

use std::sync::Arc;

use gogo_agent_core::{
    AgentTool, ToolDefinition, ToolExecuteFn, ToolFuture, ToolKind, ToolRegistry,
};
use gogo_ai::ToolResult;
use serde_json::Value;
use tracing::warn;

pub use exec::{create_exec_tool, run_command};
pub use fs::{create_fs_tool, fs_tool_definition, run_fs, FsRequest, FS_TOOL_NAME};
pub use http::create_http_tool;
pub use template::{expand_env, expand_env_with, substitute_template};

/// Wraps a declaration in the executor for its kind.
pub fn create_declared_tool(definition: ToolDefinition) -> AgentTool {
    match definition.kind {
        ToolKind::Http => create_http_tool(definition),
        ToolKind::Exec => create_exec_tool(definition),
        ToolKind::Builtin => unhandled_builtin(definition),
    }
}

fn unhandled_builtin(definition: ToolDefinition) -> AgentTool {
    let message = format!("unhandled builtin tool: {}", definition.name);
    let execute: ToolExecuteFn = Arc::new(move |_arguments: Value| -> ToolFuture {
        let message = message.clone();
        Box::pin(async move { ToolResult::failure(message) })
    });
    AgentTool::new(definition, execute)
}

/// The built-in `fs` tool plus every valid declaration. Declarations that collide with the
/// built-in or with an earlier declaration are skipped.
pub fn build_registry(definitions: Vec<ToolDefinition>) -> ToolRegistry {
    let mut builder = ToolRegistry::builder();
    if let Err(error) = builder.register_builtin_mut(create_fs_tool()) {
        warn!(error = error.as_str(), "failed to register built-in fs tool");
    }
    for definition in definitions {
        let name = definition.name.clone();
        if let Err(error) = builder.register_declared_mut(create_declared_tool(definition)) {
            warn!(tool_name = name.as_str(), error = error.as_str(), "skipping tool declaration");
        }
    }
    builder.build()
}
