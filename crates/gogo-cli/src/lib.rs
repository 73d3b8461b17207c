pub mod cli;
pub mod config;
pub mod plugin_loader;
pub mod prompt;
pub mod tools;

pub use cli::{run, run_cli_process, Cli};
pub use config::{load_config, resolve_config, ConfigError, ConfigOverrides, ResolvedConfig};
pub use plugin_loader::{default_tools_path, load_tool_definitions};
pub use tools::build_registry;
