//! Tool registry and the bounded tool-calling loop.

mod agent_loop;
mod diagnostics;
mod registry;
mod types;

pub use agent_loop::{run_prompt, AgentLoopConfig, RunSummary, MAX_ROUNDS};
pub use diagnostics::{
    line_sink, truncate_input, DiagnosticsSink, ToolExecutionReport, MAX_REPORTED_INPUT_CHARS,
};
pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use types::{
    AgentTool, ToolDefinition, ToolExecuteFn, ToolExecutor, ToolFuture, ToolKind,
    DEFAULT_TOOL_TIMEOUT,
};
