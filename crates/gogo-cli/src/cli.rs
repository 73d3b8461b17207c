use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::Parser;
use gogo_agent_core::{line_sink, run_prompt, AgentLoopConfig};
use gogo_ai::{resolve_api_key, AbortController, GogoError, Model, StreamOptions};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{gogo_config_dir, load_config, parse_duration, ConfigOverrides, ResolvedConfig};
use crate::plugin_loader::{default_tools_path, load_tool_definitions};
use crate::prompt::read_prompt;
use crate::tools::build_registry;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;
const LOG_FILE_NAME: &str = "gogo.log";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "gogo", version, about = "Streaming LLM CLI with tool calling")]
pub struct Cli {
    /// Inline prompt; read from stdin when omitted
    #[arg(short = 'p', long)]
    pub prompt: Option<String>,
    /// openai | anthropic | gemini
    #[arg(short = 'P', long)]
    pub provider: Option<String>,
    #[arg(short = 'm', long)]
    pub model: Option<String>,
    #[arg(short = 'M', long)]
    pub max_tokens: Option<u32>,
    #[arg(short = 'T', long)]
    pub temperature: Option<f64>,
    /// Path to config.toml
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Request timeout, e.g. 30s, 1m, 500ms
    #[arg(short = 't', long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
    /// Tool declaration file (JSON, or TOML by extension)
    #[arg(long)]
    pub tools: Option<PathBuf>,
    #[arg(short = 'd', long, default_value_t = false)]
    pub debug: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            tools_file: self.tools.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AbortCause {
    Interrupted,
    TimedOut,
}

pub async fn run_cli_process() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    run(cli).await
}

pub async fn run(cli: Cli) -> i32 {
    let config = match load_config(cli.config.as_deref(), &cli.overrides()) {
        Ok(config) => config,
        Err(error) => return fail("config error", error),
    };
    let prompt = match read_prompt(cli.prompt.as_deref()) {
        Ok(prompt) => prompt,
        Err(error) => return fail("prompt error", error),
    };
    if prompt.trim().is_empty() {
        return fail("prompt error", "no prompt provided");
    }

    let tools_path = config.tools_file.clone().unwrap_or_else(default_tools_path);
    let definitions = match load_tool_definitions(&tools_path) {
        Ok(definitions) => definitions,
        Err(error) => return fail("config error", error),
    };
    let registry = build_registry(definitions);
    if let Err(error) = resolve_api_key(config.provider, None) {
        return fail("config error", error);
    }

    info!(
        provider = %config.provider,
        model = config.model.as_str(),
        tools = registry.len(),
        timeout_ms = config.timeout.as_millis() as u64,
        "starting prompt"
    );

    let controller = AbortController::new();
    let signal = controller.signal();
    let cause = Arc::new(OnceLock::new());
    let watchdog = spawn_abort_watchdog(controller, config.timeout, Arc::clone(&cause));

    let loop_config = agent_loop_config(&config);
    let diagnostics = line_sink(io::stderr());
    let mut stdout = io::stdout();
    let result = run_prompt(
        &prompt,
        &registry,
        &loop_config,
        &mut stdout,
        Some(&diagnostics),
        Some(&signal),
    )
    .await;
    watchdog.abort();
    let _ = stdout.flush();

    match result {
        Ok(summary) => {
            debug!(
                rounds = summary.rounds,
                executed_tools = summary.executed_tools,
                skipped_unknown = summary.skipped_unknown,
                "prompt completed"
            );
            EXIT_SUCCESS
        }
        Err(error) => exit_for_error(&error, cause.get().copied(), config.timeout),
    }
}

fn agent_loop_config(config: &ResolvedConfig) -> AgentLoopConfig {
    let mut model = Model::new(config.provider, config.model.clone());
    if let Some(base_url) = &config.base_url {
        model = model.with_base_url(base_url.clone());
    }
    AgentLoopConfig::new(
        model,
        StreamOptions {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            ..StreamOptions::default()
        },
    )
}

fn spawn_abort_watchdog(
    controller: AbortController,
    timeout: Duration,
    cause: Arc<OnceLock<AbortCause>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let fired = tokio::select! {
            _ = wait_for_interrupt() => AbortCause::Interrupted,
            _ = tokio::time::sleep(timeout) => AbortCause::TimedOut,
        };
        warn!(cause = ?fired, "aborting request");
        let _ = cause.set(fired);
        controller.abort();
    })
}

async fn wait_for_interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn exit_for_error(error: &GogoError, cause: Option<AbortCause>, timeout: Duration) -> i32 {
    if error.is_aborted() {
        return match cause {
            Some(AbortCause::Interrupted) => {
                eprintln!("\ninterrupted");
                EXIT_INTERRUPTED
            }
            Some(AbortCause::TimedOut) => fail(
                "provider error",
                format!("request timed out after {}", format_duration(timeout)),
            ),
            None => fail("provider error", error),
        };
    }
    if error.is_configuration() {
        return fail("config error", error);
    }
    debug!(error = error.as_compact_json().as_str(), "prompt failed");
    fail("provider error", error)
}

fn fail(prefix: &str, error: impl std::fmt::Display) -> i32 {
    eprintln!("{prefix}: {error}");
    EXIT_FAILURE
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

fn init_tracing(debug: bool) {
    static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let log_dir = gogo_config_dir();
    if let Err(error) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "warning: failed to create log directory {}: {error}",
            log_dir.display()
        );
        return;
    }
    let appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = TRACE_GUARD.set(guard);

    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking);

    let init_result = if debug {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(io::stderr);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .try_init()
    };
    if let Err(error) = init_result {
        eprintln!(
            "warning: failed to initialize tracing subscriber for {}: {error}",
            log_dir.join(LOG_FILE_NAME).display()
        );
    }
}
