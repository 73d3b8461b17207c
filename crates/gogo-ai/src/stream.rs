use std::future::Future;
use std::io::Write;

use serde_json::json;
use tracing::debug;

use crate::abort::AbortSignal;
use crate::accumulator::ToolCallAccumulator;
use crate::error::{GogoError, GogoErrorCode};
use crate::providers::common::{resolve_api_key, shared_http_client, truncate_for_details};
use crate::providers::ProviderAdapter;
use crate::sse::EventReader;
use crate::types::{Conversation, Model, RoundOutput, StreamEffect, StreamOptions, ToolDeclaration};

/// Runs one request/response round trip.
///
/// Text is written to `output` as it arrives and flushed after every delta. Tool calls are
/// returned finalized, in the order they were started.
pub async fn stream_round(
    adapter: &dyn ProviderAdapter,
    model: &Model,
    options: &StreamOptions,
    conversation: &Conversation,
    tools: &[ToolDeclaration],
    output: &mut (dyn Write + Send),
    signal: Option<&AbortSignal>,
) -> Result<RoundOutput, GogoError> {
    let label = adapter.label();
    let api_key = resolve_api_key(model.provider, Some(options))?;
    let payload = adapter.build_request(model, conversation, tools, options);
    let endpoint = adapter.endpoint(model);
    let client = shared_http_client(&model.base_url);
    debug!(
        provider = %model.provider,
        model = %model.id,
        endpoint = endpoint.as_str(),
        tools = tools.len(),
        threaded = conversation.previous_response_id.is_some(),
        "sending provider request"
    );

    let request = adapter
        .authorize(client.post(endpoint.as_str()), &api_key)
        .header("Content-Type", "application/json")
        .json(&payload);
    let send = async {
        request.send().await.map_err(|error| {
            GogoError::new(
                GogoErrorCode::ProviderTransport,
                format!("{label} transport failed: {error}"),
            )
        })
    };
    let response = until_aborted(signal, send).await??;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = until_aborted(signal, response.text())
            .await?
            .unwrap_or_else(|_| "unable to read error body".to_string());
        return Err(GogoError::new(
            GogoErrorCode::ProviderHttp,
            format!("{label} HTTP {status}: {body}"),
        )
        .with_details(json!({ "status": status, "body": body })));
    }

    let mut reader = EventReader::new(response).with_signal(signal.cloned());
    let mut decoder = adapter.decoder();
    let mut accumulator = ToolCallAccumulator::new();
    let mut round = RoundOutput::default();

    while let Some(payload) = reader.next_payload().await? {
        let effects = decoder.decode(&payload).map_err(|error| {
            debug!(
                provider = %model.provider,
                payload = truncate_for_details(&payload, 200).as_str(),
                "stream payload rejected"
            );
            error
        })?;
        for effect in effects {
            match effect {
                StreamEffect::TextDelta(text) => {
                    write_delta(output, &text)?;
                    round.text.push_str(&text);
                }
                StreamEffect::ResponseIdentifier(id) => round.response_id = Some(id),
                other => accumulator.apply(&other),
            }
        }
    }

    round.tool_calls = accumulator.finish();
    debug!(
        provider = %model.provider,
        text_len = round.text.len(),
        tool_calls = round.tool_calls.len(),
        "provider round finished"
    );
    Ok(round)
}

async fn until_aborted<F>(signal: Option<&AbortSignal>, work: F) -> Result<F::Output, GogoError>
where
    F: Future,
{
    let Some(signal) = signal else {
        return Ok(work.await);
    };
    if signal.is_aborted() {
        return Err(GogoError::aborted());
    }
    tokio::select! {
        _ = signal.cancelled() => Err(GogoError::aborted()),
        output = work => Ok(output),
    }
}

fn write_delta(output: &mut (dyn Write + Send), text: &str) -> Result<(), GogoError> {
    output
        .write_all(text.as_bytes())
        .and_then(|_| output.flush())
        .map_err(|error| {
            GogoError::new(
                GogoErrorCode::OutputWrite,
                format!("failed to write output: {error}"),
            )
        })
}
