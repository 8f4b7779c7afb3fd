//! Shared error types for the MCP bridge.
//!
//! Every HTTP error response carries a JSON object with a single `error`
//! field; [`BridgeError`] maps each failure onto that body plus an HTTP
//! status code. The crate stays framework-free so both the core and the
//! router can depend on it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Failures surfaced by the bridge core.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Server '{server_id}' not found or not connected")]
    ServerNotFound { server_id: String },

    #[error("Server '{server_id}' already exists")]
    ServerAlreadyExists { server_id: String },

    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("Failed to start server: {message}")]
    SpawnFailed { message: String },

    #[error("Failed to stop server: {message}")]
    KillFailed { message: String },

    #[error("Request timed out after {seconds} seconds")]
    RequestTimeout { seconds: u64 },

    #[error("{}", exited_message(.code))]
    ServerExited { code: Option<i32> },

    /// JSON-RPC `error` object relayed from a child.
    #[error("{message}")]
    Upstream { message: String },

    #[error("{message}")]
    StreamError { message: String },

    #[error("Confirmation '{confirmation_id}' not found or expired")]
    ConfirmationNotFound { confirmation_id: String },

    #[error("Confirmation '{confirmation_id}' has expired")]
    ConfirmationExpired { confirmation_id: String },
}

fn exited_message(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("Server process exited with code {code}"),
        None => "Server process exited".to_string(),
    }
}

impl BridgeError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::InvalidRequest { .. } => 400,
            BridgeError::ServerNotFound { .. } | BridgeError::ConfirmationNotFound { .. } => 404,
            BridgeError::ServerAlreadyExists { .. } => 409,
            BridgeError::ConfirmationExpired { .. } => 410,
            BridgeError::SpawnFailed { .. }
            | BridgeError::KillFailed { .. }
            | BridgeError::RequestTimeout { .. }
            | BridgeError::ServerExited { .. }
            | BridgeError::Upstream { .. }
            | BridgeError::StreamError { .. } => 500,
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}
