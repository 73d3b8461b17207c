use std::fmt::{Display, Formatter};
use std::io::Write;
use std::sync::{Arc, Mutex};

pub const MAX_REPORTED_INPUT_CHARS: usize = 100;

/// One executed tool call, rendered as a single human-readable line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolExecutionReport {
    pub provider: String,
    pub tool_name: String,
    pub ok: bool,
    pub error: Option<String>,
    pub input: String,
}

impl Display for ToolExecutionReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tool {} provider={} ok={} err={} input={}",
            self.tool_name,
            self.provider,
            self.ok,
            self.error.as_deref().filter(|error| !error.is_empty()).unwrap_or("-"),
            truncate_input(&self.input)
        )
    }
}

pub fn truncate_input(input: &str) -> String {
    if input.chars().count() <= MAX_REPORTED_INPUT_CHARS {
        return input.to_string();
    }
    let mut truncated: String = input.chars().take(MAX_REPORTED_INPUT_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

pub type DiagnosticsSink = Arc<dyn Fn(&ToolExecutionReport) + Send + Sync>;

/// Sink writing one line per report; write failures are ignored.
pub fn line_sink<W>(writer: W) -> DiagnosticsSink
where
    W: Write + Send + 'static,
{
    let writer = Mutex::new(writer);
    Arc::new(move |report: &ToolExecutionReport| {
        if let Ok(mut writer) = writer.lock() {
            let _ = writeln!(writer, "{report}");
            let _ = writer.flush();
        }
    })
}
