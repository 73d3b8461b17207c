use std::path::{Path, PathBuf};

use gogo_agent_core::ToolDefinition;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{gogo_config_dir, ConfigError};

pub const DEFAULT_TOOLS_FILE_NAME: &str = "plugins.json";

pub fn default_tools_path() -> PathBuf {
    gogo_config_dir().join(DEFAULT_TOOLS_FILE_NAME)
}

/// Reads tool declarations. A missing file means no declared tools; entries that do not
/// describe a valid tool are skipped individually.
pub fn load_tool_definitions(path: &Path) -> Result<Vec<ToolDefinition>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no tool declaration file");
            return Ok(Vec::new());
        }
        Err(error) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: error,
            })
        }
    };

    let document = parse_document(path, &content)?;
    let entries = match document.get("tools") {
        Some(Value::Array(entries)) => entries.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            return Err(ConfigError::Invalid(format!(
                "{}: `tools` must be a list",
                path.display()
            )))
        }
    };

    let mut definitions = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let definition = serde_json::from_value::<ToolDefinition>(entry)
            .map_err(|error| error.to_string())
            .and_then(|definition| definition.validate().map(|_| definition));
        match definition {
            Ok(definition) => definitions.push(definition),
            Err(error) => warn!(path = %path.display(), index, error = error.as_str(), "skipping invalid tool entry"),
        }
    }
    debug!(path = %path.display(), tools = definitions.len(), "loaded tool declarations");
    Ok(definitions)
}

fn parse_document(path: &Path, content: &str) -> Result<Value, ConfigError> {
    let is_toml = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str::<Value>(content).map_err(|error| error.to_string())
    } else {
        serde_json::from_str::<Value>(content).map_err(|error| error.to_string())
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}
