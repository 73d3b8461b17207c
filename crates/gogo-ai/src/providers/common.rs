use std::env;
use std::sync::OnceLock;

use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{GogoError, GogoErrorCode};
use crate::types::{ProviderKind, StreamOptions};

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

/// Process-wide client; loopback targets bypass any configured proxy.
pub fn shared_http_client(base_url: &str) -> &'static Client {
    static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();
    static LOOPBACK_CLIENT: OnceLock<Client> = OnceLock::new();

    if is_loopback_base_url(base_url) {
        LOOPBACK_CLIENT.get_or_init(|| {
            Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new())
        })
    } else {
        DEFAULT_CLIENT.get_or_init(Client::new)
    }
}

pub(crate) fn is_loopback_base_url(base_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(base_url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "[::1]" || host == "::1"
}

pub fn resolve_api_key(
    provider: ProviderKind,
    options: Option<&StreamOptions>,
) -> Result<String, GogoError> {
    if let Some(api_key) = options.and_then(|options| options.api_key.clone()) {
        if !api_key.trim().is_empty() {
            return Ok(api_key);
        }
    }

    for env_key in provider.api_key_envs() {
        if let Ok(value) = env::var(env_key) {
            if !value.trim().is_empty() {
                return Ok(value);
            }
        }
    }

    Err(GogoError::new(
        GogoErrorCode::ProviderAuthMissing,
        format!(
            "missing API key for provider '{}': set {}",
            provider,
            provider.api_key_envs().join(" or ")
        ),
    ))
}

pub(crate) fn default_tool_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub(crate) fn schema_or_default(parameters: &Value) -> Value {
    if parameters.is_null() {
        default_tool_schema()
    } else {
        parameters.clone()
    }
}

pub(crate) fn parse_event(provider: &str, data: &str) -> Result<Value, GogoError> {
    serde_json::from_str(data).map_err(|error| {
        GogoError::new(
            GogoErrorCode::ProviderProtocol,
            format!("invalid {provider} stream event: {error}"),
        )
        .with_details(json!({ "event": truncate_for_details(data, 800) }))
    })
}

pub(crate) fn truncate_for_details(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push('…');
    truncated
}
