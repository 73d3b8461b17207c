use std::fs::{self, Metadata, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use gogo_agent_core::{AgentTool, ToolDefinition, ToolExecutor, ToolKind};
use gogo_ai::ToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

pub const FS_TOOL_NAME: &str = "fs";

pub fn fs_tool_definition() -> ToolDefinition {
    let mut definition = ToolDefinition::new(
        FS_TOOL_NAME,
        "Filesystem operations (read/write/append/delete/mkdir/rmdir/list/stat/move/copy)",
        ToolKind::Builtin,
    );
    definition.input_schema = Some(json!({
        "type": "object",
        "properties": {
            "op": {
                "type": "string",
                "description": "Operation: read, write, append, delete, mkdir, rmdir, list, stat, move, copy"
            },
            "path": { "type": "string", "description": "File or directory path" },
            "data": { "type": "string", "description": "Data to write (for write/append)" },
            "dest": { "type": "string", "description": "Destination path (for move/copy)" }
        },
        "required": ["op", "path"]
    }));
    definition
}

pub fn create_fs_tool() -> AgentTool {
    AgentTool::new(fs_tool_definition(), Arc::new(FsToolExecutor))
}

struct FsToolExecutor;

#[async_trait]
impl ToolExecutor for FsToolExecutor {
    async fn execute(&self, arguments: Value) -> ToolResult {
        match serde_json::from_value::<FsRequest>(arguments) {
            Ok(request) => run_fs(&request),
            Err(error) => ToolResult::failure(format!("invalid input: {error}")),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FsRequest {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub dest: String,
}

pub fn run_fs(request: &FsRequest) -> ToolResult {
    let path = request.path.as_str();
    match request.op.as_str() {
        "read" => with_path(path, |path| {
            fs::read(path).map(|bytes| json!(String::from_utf8_lossy(&bytes)))
        }),
        "write" => with_path(path, |path| fs::write(path, &request.data).map(|_| Value::Null)),
        "append" => with_path(path, |path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(request.data.as_bytes()))
                .map(|_| Value::Null)
        }),
        "delete" => with_path(path, |path| remove_all(path).map(|_| Value::Null)),
        "mkdir" => with_path(path, |path| fs::create_dir_all(path).map(|_| Value::Null)),
        "rmdir" => with_path(path, |path| fs::remove_dir(path).map(|_| Value::Null)),
        "list" => list_dir(if path.is_empty() { "." } else { path }),
        "stat" => with_path(path, |path| {
            fs::metadata(path).map(|metadata| {
                json!({
                    "path": path,
                    "is_dir": metadata.is_dir(),
                    "size": metadata.len(),
                    "mode": mode_string(&metadata),
                    "mod_time": mod_time(&metadata),
                })
            })
        }),
        "move" => with_source_and_dest(path, &request.dest, |source, dest| {
            fs::rename(source, dest).map(|_| ToolResult::empty_success())
        }),
        "copy" => with_source_and_dest(path, &request.dest, copy_file),
        _ => ToolResult::failure("unknown op"),
    }
}

fn with_path<F>(path: &str, operation: F) -> ToolResult
where
    F: FnOnce(&str) -> std::io::Result<Value>,
{
    if path.is_empty() {
        return ToolResult::failure("path is required");
    }
    match operation(path) {
        Ok(Value::Null) => ToolResult::empty_success(),
        Ok(data) => ToolResult::success(data),
        Err(error) => ToolResult::failure(error.to_string()),
    }
}

fn with_source_and_dest<F>(source: &str, dest: &str, operation: F) -> ToolResult
where
    F: FnOnce(&str, &str) -> std::io::Result<ToolResult>,
{
    if source.is_empty() || dest.is_empty() {
        return ToolResult::failure("path and dest are required");
    }
    operation(source, dest).unwrap_or_else(|error| ToolResult::failure(error.to_string()))
}

fn remove_all(path: &str) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn list_dir(path: &str) -> ToolResult {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(error) => return ToolResult::failure(error.to_string()),
    };

    let mut listed = Vec::new();
    for entry in entries {
        let described = entry.and_then(|entry| {
            let metadata = entry.metadata()?;
            Ok(json!({
                "name": entry.file_name().to_string_lossy(),
                "is_dir": metadata.is_dir(),
                "size": metadata.len(),
                "mode": mode_string(&metadata),
                "mod_time": mod_time(&metadata),
            }))
        });
        match described {
            Ok(value) => listed.push(value),
            Err(error) => return ToolResult::failure(error.to_string()),
        }
    }
    listed.sort_by(|left, right| left["name"].as_str().cmp(&right["name"].as_str()));
    ToolResult::success(Value::Array(listed))
}

fn copy_file(source: &str, dest: &str) -> std::io::Result<ToolResult> {
    if fs::metadata(source)?.is_dir() {
        return Ok(ToolResult::failure("copy supports files only"));
    }
    if let Some(parent) = Path::new(dest).parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, dest)?;
    Ok(ToolResult::empty_success())
}

fn mod_time(metadata: &Metadata) -> String {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Local>::from(modified).to_rfc3339()
}

#[cfg(unix)]
fn mode_string(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let bits = metadata.permissions().mode();
    let kind = if metadata.is_dir() {
        'd'
    } else if metadata.file_type().is_symlink() {
        'L'
    } else {
        '-'
    };
    let mut mode = String::with_capacity(10);
    mode.push(kind);
    for shift in [6_u32, 3, 0] {
        let triple = (bits >> shift) & 0o7;
        mode.push(if triple & 0o4 != 0 { 'r' } else { '-' });
        mode.push(if triple & 0o2 != 0 { 'w' } else { '-' });
        mode.push(if triple & 0o1 != 0 { 'x' } else { '-' });
    }
    mode
}

#[cfg(not(unix))]
fn mode_string(metadata: &Metadata) -> String {
    let kind = if metadata.is_dir() { 'd' } else { '-' };
    let write = if metadata.permissions().readonly() { '-' } else { 'w' };
    format!("{kind}r{write}-r{write}-r{write}-")
}
