use std::collections::{BTreeMap, BTreeSet};

use gogo_ai::{ToolDeclaration, ToolResult};
use serde_json::Value;
use tracing::debug;

use crate::types::{AgentTool, ToolDefinition};

const INSTRUCTION_HEADER: &str =
    "You have access to the following tools. Use them when appropriate:";
const INSTRUCTION_FOOTER: &str = "Call tools when needed to complete the user's request. \
Do not claim to have performed actions without using the appropriate tool.";

/// Loaded tools keyed by name. Immutable once built.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    by_name: BTreeMap<String, AgentTool>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name).map(|tool| &tool.definition)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn all(&self) -> Vec<&ToolDefinition> {
        self.by_name.values().map(|tool| &tool.definition).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.by_name
            .values()
            .map(|tool| tool.definition.declaration())
            .collect()
    }

    /// System instruction listing every tool, or `None` when there are no tools.
    pub fn instruction(&self) -> Option<String> {
        if self.by_name.is_empty() {
            return None;
        }
        let mut text = String::from(INSTRUCTION_HEADER);
        text.push_str("\n\n");
        for tool in self.by_name.values() {
            text.push_str(&format!(
                "- {}: {}\n",
                tool.definition.name, tool.definition.description
            ));
        }
        text.push('\n');
        text.push_str(INSTRUCTION_FOOTER);
        Some(text)
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> ToolResult {
        match self.by_name.get(name) {
            Some(tool) => tool.execute.execute(arguments).await,
            None => ToolResult::failure(format!("unknown tool: {name}")),
        }
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistryBuilder {
    by_name: BTreeMap<String, AgentTool>,
    builtin_names: BTreeSet<String>,
}

impl ToolRegistryBuilder {
    pub fn register_builtin(self, tool: AgentTool) -> Result<Self, String> {
        let mut builder = self;
        builder.register_builtin_mut(tool)?;
        Ok(builder)
    }

    /// Built-in tools replace any declared tool of the same name.
    pub fn register_builtin_mut(&mut self, tool: AgentTool) -> Result<(), String> {
        tool.definition.validate()?;
        let name = tool.name().to_string();
        if self.builtin_names.contains(&name) {
            return Err(format!("duplicate built-in tool '{name}'"));
        }
        if self.by_name.contains_key(&name) {
            debug!(tool_name = name.as_str(), "built-in tool replaces declared tool");
        }
        self.builtin_names.insert(name.clone());
        self.by_name.insert(name, tool);
        Ok(())
    }

    pub fn register_declared(self, tool: AgentTool) -> Result<Self, String> {
        let mut builder = self;
        builder.register_declared_mut(tool)?;
        Ok(builder)
    }

    pub fn register_declared_mut(&mut self, tool: AgentTool) -> Result<(), String> {
        tool.definition.validate()?;
        let name = tool.name().to_string();
        if self.builtin_names.contains(&name) {
            return Err(format!("tool '{name}' is provided built in"));
        }
        if self.by_name.contains_key(&name) {
            return Err(format!("duplicate tool '{name}'"));
        }
        self.by_name.insert(name, tool);
        Ok(())
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            by_name: self.by_name,
        }
    }
}
