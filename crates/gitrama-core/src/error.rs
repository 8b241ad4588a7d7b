//! Error taxonomy shared by every tool.
//!
//! Each failure reaching a caller is one of three kinds. The kind is part of
//! the structured payload returned to the client, so its string form is
//! stable.

use serde::Serialize;

/// Discriminant of a [`ToolError`], serialized into error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ConfigurationError,
    ExternalToolError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::ExternalToolError => "external_tool_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    /// Bad, missing, or out-of-range parameter. Never forwarded.
    #[error("{0}")]
    Validation(String),

    /// Missing credential, unknown provider, or unreadable config/state file.
    #[error("{0}")]
    Configuration(String),

    /// Non-zero exit, spawn failure, timeout, or error response from the
    /// external CLI/API. The message is passed through verbatim.
    #[error("{message}")]
    ExternalTool {
        message: String,
        exit_code: Option<i32>,
    },
}

/// Wire form of a [`ToolError`].
#[derive(Debug, Serialize)]
pub struct ErrorPayload<'a> {
    pub kind: ErrorKind,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ToolError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ToolError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        ToolError::Configuration(msg.into())
    }

    pub fn external(msg: impl Into<String>, exit_code: Option<i32>) -> Self {
        ToolError::ExternalTool {
            message: msg.into(),
            exit_code,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Validation(_) => ErrorKind::ValidationError,
            ToolError::Configuration(_) => ErrorKind::ConfigurationError,
            ToolError::ExternalTool { .. } => ErrorKind::ExternalToolError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ToolError::Validation(m) | ToolError::Configuration(m) => m,
            ToolError::ExternalTool { message, .. } => message,
        }
    }

    pub fn payload(&self) -> ErrorPayload<'_> {
        ErrorPayload {
            kind: self.kind(),
            message: self.message(),
            exit_code: match self {
                ToolError::ExternalTool { exit_code, .. } => *exit_code,
                _ => None,
            },
        }
    }

    /// Structured JSON body: `{"kind": "...", "message": "..."}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.payload()).unwrap_or_else(|_| {
            serde_json::json!({ "kind": self.kind().as_str(), "message": self.message() })
        })
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
