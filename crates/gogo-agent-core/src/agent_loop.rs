use std::io::Write;
use std::time::Instant;

use gogo_ai::{
    adapter_for, stream_round, AbortSignal, Conversation, GogoError, Model, ProviderAdapterRef,
    RoundOutput, StreamOptions, ToolCall, ToolDeclaration, ToolExchange, ToolResult,
};
use tracing::{debug, warn};

use crate::diagnostics::{DiagnosticsSink, ToolExecutionReport};
use crate::registry::ToolRegistry;

/// Number of provider round trips after which tool calls are no longer executed.
pub const MAX_ROUNDS: usize = 2;

#[derive(Clone)]
pub struct AgentLoopConfig {
    pub model: Model,
    pub options: StreamOptions,
    pub adapter: ProviderAdapterRef,
}

impl AgentLoopConfig {
    pub fn new(model: Model, options: StreamOptions) -> Self {
        let adapter = adapter_for(model.provider);
        Self {
            model,
            options,
            adapter,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: usize,
    pub executed_tools: usize,
    pub skipped_unknown: usize,
    pub ignored_followup_calls: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopState {
    Idle,
    Streaming(usize),
    AwaitingTools,
    Executing,
    Done,
}

/// Streams the prompt, runs any requested tools and, if at least one ran, streams once more
/// with the results. Tool calls requested by the second round are never executed.
pub async fn run_prompt(
    prompt: &str,
    registry: &ToolRegistry,
    config: &AgentLoopConfig,
    output: &mut (dyn Write + Send),
    diagnostics: Option<&DiagnosticsSink>,
    signal: Option<&AbortSignal>,
) -> Result<RunSummary, GogoError> {
    let mut runner = AgentLoopRunner::new(registry, config, diagnostics, signal);
    runner.run(prompt, output).await
}

struct AgentLoopRunner<'a> {
    registry: &'a ToolRegistry,
    config: &'a AgentLoopConfig,
    diagnostics: Option<&'a DiagnosticsSink>,
    signal: Option<&'a AbortSignal>,
    options: StreamOptions,
    declarations: Vec<ToolDeclaration>,
    state: LoopState,
    summary: RunSummary,
    started_at: Instant,
}

impl<'a> AgentLoopRunner<'a> {
    fn new(
        registry: &'a ToolRegistry,
        config: &'a AgentLoopConfig,
        diagnostics: Option<&'a DiagnosticsSink>,
        signal: Option<&'a AbortSignal>,
    ) -> Self {
        let mut options = config.options.clone();
        if options.system_prompt.is_none() {
            options.system_prompt = registry.instruction();
        }
        Self {
            registry,
            config,
            diagnostics,
            signal,
            options,
            declarations: registry.declarations(),
            state: LoopState::Idle,
            summary: RunSummary::default(),
            started_at: Instant::now(),
        }
    }

    async fn run(
        &mut self,
        prompt: &str,
        output: &mut (dyn Write + Send),
    ) -> Result<RunSummary, GogoError> {
        let adapter = self.config.adapter.clone();
        let conversation = adapter.initial_conversation(prompt);

        let first = self.stream(&conversation, output).await?;
        if first.tool_calls.is_empty() {
            return Ok(self.finish());
        }

        self.transition(LoopState::AwaitingTools);
        let exchanges = self.execute_tool_calls(&first.tool_calls).await?;
        if exchanges.is_empty() {
            return Ok(self.finish());
        }

        let continuation = adapter.build_continuation(&conversation, &first, &exchanges);
        let second = self.stream(&continuation, output).await?;
        if !second.tool_calls.is_empty() {
            let names: Vec<&str> = second
                .tool_calls
                .iter()
                .map(|call| call.name.as_str())
                .collect();
            warn!(
                provider = %self.config.model.provider,
                tools = ?names,
                "tool calls after the final round are not executed"
            );
            self.summary.ignored_followup_calls = second.tool_calls.len();
        }
        Ok(self.finish())
    }

    async fn stream(
        &mut self,
        conversation: &Conversation,
        output: &mut (dyn Write + Send),
    ) -> Result<RoundOutput, GogoError> {
        let round = self.summary.rounds + 1;
        debug_assert!(round <= MAX_ROUNDS);
        self.transition(LoopState::Streaming(round));
        self.summary.rounds = round;
        stream_round(
            self.config.adapter.as_ref(),
            &self.config.model,
            &self.options,
            conversation,
            &self.declarations,
            output,
            self.signal,
        )
        .await
    }

    async fn execute_tool_calls(
        &mut self,
        calls: &[ToolCall],
    ) -> Result<Vec<ToolExchange>, GogoError> {
        self.transition(LoopState::Executing);
        let mut exchanges = Vec::with_capacity(calls.len());

        for call in calls {
            if !self.registry.contains(&call.name) {
                debug!(tool_name = call.name.as_str(), call_id = call.id.as_str(), "skipping unknown tool");
                self.summary.skipped_unknown += 1;
                continue;
            }

            let started = Instant::now();
            let result = self.execute_one(call).await?;
            debug!(
                tool_name = call.name.as_str(),
                call_id = call.id.as_str(),
                ok = result.ok,
                duration_ms = started.elapsed().as_millis() as u64,
                "tool executed"
            );
            self.report(call, &result);
            self.summary.executed_tools += 1;
            exchanges.push(ToolExchange {
                call: call.clone(),
                result,
            });
        }

        Ok(exchanges)
    }

    async fn execute_one(&self, call: &ToolCall) -> Result<ToolResult, GogoError> {
        let execution = self.registry.execute(&call.name, call.arguments.clone());
        match self.signal {
            Some(signal) => {
                if signal.is_aborted() {
                    return Err(GogoError::aborted());
                }
                tokio::select! {
                    _ = signal.cancelled() => Err(GogoError::aborted()),
                    result = execution => Ok(result),
                }
            }
            None => Ok(execution.await),
        }
    }

    fn report(&self, call: &ToolCall, result: &ToolResult) {
        let Some(sink) = self.diagnostics else {
            return;
        };
        sink(&ToolExecutionReport {
            provider: self.config.model.provider.to_string(),
            tool_name: call.name.clone(),
            ok: result.ok,
            error: result.error.clone(),
            input: call.raw_arguments.clone(),
        });
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = ?self.state, to = ?next, "agent loop transition");
        self.state = next;
    }

    fn finish(&mut self) -> RunSummary {
        self.transition(LoopState::Done);
        debug!(
            rounds = self.summary.rounds,
            executed_tools = self.summary.executed_tools,
            skipped_unknown = self.summary.skipped_unknown,
            duration_ms = self.started_at.elapsed().as_millis() as u64,
            "agent loop finished"
        );
        self.summary.clone()
    }
}
