use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gogo_agent_core::{
    run_prompt, AgentLoopConfig, AgentTool, DiagnosticsSink, ToolDefinition, ToolExecuteFn,
    ToolExecutionReport, ToolFuture, ToolKind, ToolRegistry,
};
use gogo_ai::{GogoErrorCode, Model, ProviderKind, StreamOptions, ToolResult};
use serde_json::{json, Value};

struct ScriptedServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedServer {
    fn hits(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    fn request(&self, index: usize) -> Value {
        self.requests.lock().expect("requests lock")[index].clone()
    }
}

/// Answers each connection with the next scripted `(status, body)`; extra requests get a 500.
fn spawn_scripted_server(script: Vec<(u16, String)>) -> ScriptedServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local test server");
    let address = listener.local_addr().expect("server local addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_thread = Arc::clone(&requests);

    thread::spawn(move || {
        let mut script = script.into_iter();
        for stream in listener.incoming() {
            let Ok(mut socket) = stream else {
                break;
            };
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("set read timeout");
            let body = read_body(&mut socket).unwrap_or_default();
            requests_thread
                .lock()
                .expect("requests lock")
                .push(serde_json::from_str(&body).unwrap_or(Value::Null));

            let (status, payload) = script
                .next()
                .unwrap_or((500, r#"{"error":"unexpected request"}"#.to_string()));
            let content_type = if status < 300 {
                "text/event-stream"
            } else {
                "application/json"
            };
            let response = format!(
                "HTTP/1.1 {status} Scripted\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                payload.as_bytes().len(),
                payload
            );
            let _ = socket.write_all(response.as_bytes());
            let _ = socket.flush();
        }
    });

    ScriptedServer {
        base_url: format!("http://{address}/v1"),
        requests,
    }
}

fn read_body(socket: &mut TcpStream) -> Option<String> {
    let mut raw = Vec::new();
    let mut buffer = [0_u8; 4096];
    let header_end = loop {
        let read = socket.read(&mut buffer).ok()?;
        if read == 0 {
            return None;
        }
        raw.extend_from_slice(&buffer[..read]);
        if let Some(position) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
            break position;
        }
    };
    let head = String::from_utf8_lossy(&raw[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = raw[(header_end + 4)..].to_vec();
    while body.len() < content_length {
        let read = socket.read(&mut buffer).ok()?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&buffer[..read]);
    }
    Some(String::from_utf8_lossy(&body).to_string())
}

fn sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

fn openai_text(response_id: &str, text: &str) -> String {
    sse(&[
        json!({ "type": "response.created", "response": { "id": response_id } }),
        json!({ "type": "response.output_text.delta", "item_id": "msg", "delta": text }),
    ])
}

fn openai_tool_calls(response_id: &str, text: &str, calls: &[(&str, &str, &str)]) -> String {
    let mut events = vec![
        json!({ "type": "response.created", "response": { "id": response_id } }),
        json!({ "type": "response.output_text.delta", "item_id": "msg", "delta": text }),
    ];
    for (index, (call_id, name, arguments)) in calls.iter().enumerate() {
        let item_id = format!("fc_{index}");
        events.push(json!({
            "type": "response.output_item.added",
            "item": { "type": "function_call", "id": item_id, "call_id": call_id, "name": name, "arguments": "" },
        }));
        events.push(json!({
            "type": "response.function_call_arguments.delta",
            "item_id": item_id,
            "delta": arguments,
        }));
    }
    sse(&events)
}

fn counting_tool(name: &str, calls: Arc<Mutex<Vec<Value>>>) -> AgentTool {
    let definition = ToolDefinition::new(name, format!("{name} test tool"), ToolKind::Builtin);
    let execute: ToolExecuteFn = Arc::new(move |arguments: Value| -> ToolFuture {
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            calls.lock().expect("calls lock").push(arguments.clone());
            ToolResult::success(json!({ "entries": ["a.txt", "b.txt"] }))
        })
    });
    AgentTool::new(definition, execute)
}

fn registry_with(tool: AgentTool) -> ToolRegistry {
    ToolRegistry::builder()
        .register_builtin(tool)
        .expect("register tool")
        .build()
}

fn config(provider: ProviderKind, base_url: &str) -> AgentLoopConfig {
    let model = Model::new(provider, provider.default_model()).with_base_url(base_url);
    AgentLoopConfig::new(
        model,
        StreamOptions {
            api_key: Some("test-key".to_string()),
            ..StreamOptions::default()
        },
    )
}

fn recording_sink() -> (DiagnosticsSink, Arc<Mutex<Vec<ToolExecutionReport>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let reports_sink = Arc::clone(&reports);
    let sink: DiagnosticsSink = Arc::new(move |report: &ToolExecutionReport| {
        reports_sink.lock().expect("reports lock").push(report.clone());
    });
    (sink, reports)
}

#[tokio::test]
async fn plain_answer_needs_a_single_round() {
    let server = spawn_scripted_server(vec![(200, openai_text("resp_1", "Hello there."))]);
    let registry = ToolRegistry::default();
    let mut output = Vec::new();

    let summary = run_prompt(
        "hi",
        &registry,
        &config(ProviderKind::OpenAi, &server.base_url),
        &mut output,
        None,
        None,
    )
    .await
    .expect("run succeeds");

    assert_eq!(String::from_utf8(output).expect("utf8"), "Hello there.");
    assert_eq!(summary.rounds, 1);
    assert_eq!(server.hits(), 1);
    assert!(server.request(0).get("tools").is_none());
}

#[tokio::test]
async fn known_tool_runs_once_and_results_are_threaded_back() {
    let server = spawn_scripted_server(vec![
        (
            200,
            openai_tool_calls(
                "resp_1",
                "Checking. ",
                &[("call_1", "fs", r#"{"path": "/tmp", "op": "list"}"#)],
            ),
        ),
        (200, openai_text("resp_2", "Two files.")),
    ]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_tool("fs", Arc::clone(&calls)));
    let (sink, reports) = recording_sink();
    let mut output = Vec::new();

    let summary = run_prompt(
        "what is in /tmp?",
        &registry,
        &config(ProviderKind::OpenAi, &server.base_url),
        &mut output,
        Some(&sink),
        None,
    )
    .await
    .expect("run succeeds");

    assert_eq!(String::from_utf8(output).expect("utf8"), "Checking. Two files.");
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.executed_tools, 1);
    assert_eq!(
        calls.lock().expect("calls lock").as_slice(),
        &[json!({ "op": "list", "path": "/tmp" })]
    );

    let first = server.request(0);
    assert_eq!(first["tools"][0]["name"], "fs");
    assert!(first["input"][0]["content"][0]["text"]
        .as_str()
        .expect("system instruction")
        .contains("- fs: fs test tool"));

    let continuation = server.request(1);
    assert_eq!(continuation["previous_response_id"], "resp_1");
    assert_eq!(continuation["input"][0]["type"], "function_call_output");
    assert_eq!(continuation["input"][0]["call_id"], "call_1");
    let output_value: Value = serde_json::from_str(
        continuation["input"][0]["output"]
            .as_str()
            .expect("output string"),
    )
    .expect("output is JSON");
    assert_eq!(output_value["ok"], true);

    let reports = reports.lock().expect("reports lock").clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].to_string(),
        r#"tool fs provider=openai ok=true err=- input={"path": "/tmp", "op": "list"}"#
    );
}

#[tokio::test]
async fn only_unknown_tools_end_after_first_round() {
    let server = spawn_scripted_server(vec![(
        200,
        openai_tool_calls("resp_1", "Sure.", &[("call_9", "weather", r#"{"city":"Oslo"}"#)]),
    )]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_tool("fs", Arc::clone(&calls)));
    let (sink, reports) = recording_sink();
    let mut output = Vec::new();

    let summary = run_prompt(
        "weather?",
        &registry,
        &config(ProviderKind::OpenAi, &server.base_url),
        &mut output,
        Some(&sink),
        None,
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.skipped_unknown, 1);
    assert_eq!(server.hits(), 1);
    assert!(calls.lock().expect("calls lock").is_empty());
    assert!(reports.lock().expect("reports lock").is_empty());
}

#[tokio::test]
async fn continuation_carries_only_known_calls() {
    let server = spawn_scripted_server(vec![
        (
            200,
            openai_tool_calls(
                "resp_1",
                "",
                &[
                    ("call_a", "weather", r#"{"city":"Oslo"}"#),
                    ("call_b", "fs", r#"{"op":"stat","path":"."}"#),
                ],
            ),
        ),
        (200, openai_text("resp_2", "Done.")),
    ]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_tool("fs", Arc::clone(&calls)));
    let mut output = Vec::new();

    let summary = run_prompt(
        "mixed",
        &registry,
        &config(ProviderKind::OpenAi, &server.base_url),
        &mut output,
        None,
        None,
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.executed_tools, 1);
    assert_eq!(summary.skipped_unknown, 1);
    let continuation = server.request(1);
    let items = continuation["input"].as_array().expect("input items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["call_id"], "call_b");
}

#[tokio::test]
async fn second_round_tool_calls_are_never_executed() {
    let server = spawn_scripted_server(vec![
        (
            200,
            openai_tool_calls("resp_1", "", &[("call_1", "fs", r#"{"op":"list","path":"."}"#)]),
        ),
        (
            200,
            openai_tool_calls("resp_2", "Again?", &[("call_2", "fs", r#"{"op":"list","path":"/"}"#)]),
        ),
        (200, openai_text("resp_3", "never requested")),
    ]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_tool("fs", Arc::clone(&calls)));
    let mut output = Vec::new();

    let summary = run_prompt(
        "loop",
        &registry,
        &config(ProviderKind::OpenAi, &server.base_url),
        &mut output,
        None,
        None,
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.ignored_followup_calls, 1);
    assert_eq!(calls.lock().expect("calls lock").len(), 1);
    assert_eq!(server.hits(), 2);
    assert_eq!(String::from_utf8(output).expect("utf8"), "Again?");
}

#[tokio::test]
async fn second_round_failure_keeps_first_round_output() {
    let server = spawn_scripted_server(vec![
        (
            200,
            openai_tool_calls("resp_1", "Partial answer. ", &[("call_1", "fs", "{}")]),
        ),
        (500, r#"{"error":"overloaded"}"#.to_string()),
    ]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_tool("fs", Arc::clone(&calls)));
    let mut output = Vec::new();

    let error = run_prompt(
        "fail later",
        &registry,
        &config(ProviderKind::OpenAi, &server.base_url),
        &mut output,
        None,
        None,
    )
    .await
    .expect_err("second round fails");

    assert_eq!(error.code, GogoErrorCode::ProviderHttp);
    assert!(error.message.contains("500"));
    assert_eq!(String::from_utf8(output).expect("utf8"), "Partial answer. ");
    assert_eq!(calls.lock().expect("calls lock").as_slice(), &[json!({})]);
}

#[tokio::test]
async fn anthropic_continuation_replays_assistant_turn() {
    let first = sse(&[
        json!({ "type": "message_start", "message": { "id": "msg_1" } }),
        json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "text", "text": "" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "Listing." } }),
        json!({ "type": "content_block_start", "index": 1, "content_block": { "type": "tool_use", "id": "toolu_1", "name": "fs", "input": {} } }),
        json!({ "type": "content_block_delta", "index": 1, "delta": { "type": "input_json_delta", "partial_json": "{\"op\":\"list\",\"path\":\".\"}" } }),
        json!({ "type": "content_block_stop", "index": 1 }),
        json!({ "type": "message_stop" }),
    ]);
    let second = sse(&[
        json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "text", "text": "" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": " Found two." } }),
        json!({ "type": "message_stop" }),
    ]);
    let server = spawn_scripted_server(vec![(200, first), (200, second)]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_tool("fs", Arc::clone(&calls)));
    let mut output = Vec::new();

    run_prompt(
        "list cwd",
        &registry,
        &config(ProviderKind::Anthropic, &server.base_url),
        &mut output,
        None,
        None,
    )
    .await
    .expect("run succeeds");

    assert_eq!(String::from_utf8(output).expect("utf8"), "Listing. Found two.");
    let continuation = server.request(1);
    let messages = continuation["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"][1]["type"], "tool_use");
    assert_eq!(messages[1]["content"][1]["id"], "toolu_1");
    assert_eq!(messages[2]["role"], "user");
    assert_eq!(messages[2]["content"][0]["type"], "tool_result");
    assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
    assert!(continuation["system"]
        .as_str()
        .expect("system prompt")
        .starts_with("You have access to the following tools."));
}

#[tokio::test]
async fn gemini_continuation_returns_function_responses() {
    let first = sse(&[
        json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": "Looking." }] } }] }),
        json!({ "candidates": [{ "content": { "role": "model", "parts": [
            { "functionCall": { "name": "fs", "args": { "op": "list", "path": "." } } },
        ] } }] }),
    ]);
    let second = sse(&[
        json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": " Two files." }] } }] }),
        json!({ "usageMetadata": { "promptTokenCount": 12 } }),
    ]);
    let server = spawn_scripted_server(vec![(200, first), (200, second)]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with(counting_tool("fs", Arc::clone(&calls)));
    let (sink, reports) = recording_sink();
    let mut output = Vec::new();

    let summary = run_prompt(
        "list cwd",
        &registry,
        &config(ProviderKind::Gemini, &server.base_url),
        &mut output,
        Some(&sink),
        None,
    )
    .await
    .expect("run succeeds");

    assert_eq!(String::from_utf8(output).expect("utf8"), "Looking. Two files.");
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.executed_tools, 1);
    assert_eq!(
        calls.lock().expect("calls lock").as_slice(),
        &[json!({ "op": "list", "path": "." })]
    );

    let first_request = server.request(0);
    assert_eq!(
        first_request["tools"][0]["functionDeclarations"][0]["name"],
        "fs"
    );
    assert!(first_request["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .expect("system instruction")
        .contains("- fs: fs test tool"));

    let continuation = server.request(1);
    let contents = continuation["contents"].as_array().expect("contents");
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["parts"][0]["text"], "list cwd");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "Looking.");
    assert_eq!(
        contents[1]["parts"][1]["functionCall"],
        json!({ "name": "fs", "args": { "op": "list", "path": "." } })
    );
    assert_eq!(contents[2]["role"], "user");
    let response = &contents[2]["parts"][0]["functionResponse"];
    assert_eq!(response["name"], "fs");
    assert!(response.get("id").is_none());
    assert_eq!(response["response"]["result"]["ok"], true);
    assert_eq!(
        response["response"]["result"]["data"],
        json!({ "entries": ["a.txt", "b.txt"] })
    );

    let reports = reports.lock().expect("reports lock").clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].provider, "gemini");
    assert_eq!(reports[0].tool_name, "fs");
}
