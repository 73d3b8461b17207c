use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GogoErrorCode {
    ConfigInvalid,
    ProviderAuthMissing,
    ProviderHttp,
    ProviderTransport,
    ProviderProtocol,
    OutputWrite,
    Aborted,
    ToolNotFound,
    ToolArgumentsInvalid,
    ToolExecutionFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GogoError {
    pub code: GogoErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl GogoError {
    pub fn new(code: GogoErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn aborted() -> Self {
        Self::new(GogoErrorCode::Aborted, "request aborted")
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_aborted(&self) -> bool {
        self.code == GogoErrorCode::Aborted
    }

    /// Errors that must stop the process before any request is sent.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.code,
            GogoErrorCode::ConfigInvalid | GogoErrorCode::ProviderAuthMissing
        )
    }

    pub fn as_compact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"code\":\"provider_protocol\",\"message\":\"{}\"}}",
                self.message.replace('\"', "\\\"")
            )
        })
    }
}

impl Display for GogoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GogoError {}
