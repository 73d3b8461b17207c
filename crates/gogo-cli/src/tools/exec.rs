use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gogo_agent_core::{AgentTool, ToolDefinition, ToolExecutor};
use gogo_ai::ToolResult;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::common::{argument_map, output_value};
use super::template::substitute_template;

pub fn create_exec_tool(definition: ToolDefinition) -> AgentTool {
    let executor = ExecToolExecutor {
        definition: definition.clone(),
    };
    AgentTool::new(definition, Arc::new(executor))
}

struct ExecToolExecutor {
    definition: ToolDefinition,
}

#[async_trait]
impl ToolExecutor for ExecToolExecutor {
    async fn execute(&self, arguments: Value) -> ToolResult {
        match argument_map(&arguments) {
            Ok(params) => execute_exec(&self.definition, &params).await,
            Err(result) => result,
        }
    }
}

async fn execute_exec(definition: &ToolDefinition, params: &Map<String, Value>) -> ToolResult {
    let program = substitute_template(definition.command.as_deref().unwrap_or_default(), params);
    let args: Vec<String> = definition
        .args
        .iter()
        .map(|arg| substitute_template(arg, params))
        .collect();
    run_command(&program, &args, definition.timeout()).await
}

/// Runs `program` directly (no shell). On timeout the child is killed and reaped before
/// returning.
pub async fn run_command(program: &str, args: &[String], limit: Duration) -> ToolResult {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(error) => return ToolResult::failure(error.to_string()),
    };

    let mut stdout = collect(child.stdout.take());
    let mut stderr = collect(child.stderr.take());

    // Pipes stay open while any grandchild holds them, so the drain shares the deadline.
    let finished = timeout(limit, async {
        let status = child.wait().await?;
        let stdout = (&mut stdout).await.unwrap_or_default();
        let stderr = (&mut stderr).await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout, stderr))
    })
    .await;

    let (status, stdout, stderr) = match finished {
        Ok(Ok(output)) => output,
        Ok(Err(error)) => return ToolResult::failure(error.to_string()),
        Err(_) => {
            if matches!(child.try_wait(), Ok(None)) {
                if let Err(error) = child.kill().await {
                    warn!(program, error = %error, "failed to kill timed out command");
                }
            }
            stdout.abort();
            stderr.abort();
            debug!(program, timeout_ms = limit.as_millis() as u64, "command timed out");
            return ToolResult::failure("command timed out");
        }
    };

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr).to_string();
        if stderr.is_empty() {
            return ToolResult::failure(status.to_string());
        }
        return ToolResult::failure(stderr);
    }
    ToolResult::success(output_value(&stdout))
}

fn collect<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer).await;
        }
        buffer
    })
}
