//! Error types for the MCP client.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use std::time::Duration;

use thiserror::Error;

/// Primary error type for every session, transport, and auth operation.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Timed out after {waited_ms}ms waiting for the server to announce a submission endpoint")]
    EndpointDiscoveryTimeout { waited_ms: u64 },

    #[error("Transport error (status {status}): {body}")]
    Transport { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("No reply to {method} (id {id}) within {waited_ms}ms")]
    ResponseTimeout {
        method: String,
        id: String,
        waited_ms: u64,
    },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Session disconnected: {0}")]
    Disconnected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl McpError {
    /// Create a transport error from a non-2xx status and whatever body was readable.
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Self::Transport {
            status,
            body: body.into(),
        }
    }

    /// Discovery deadline elapsed with no announced endpoint.
    pub fn discovery_timeout(deadline: Duration) -> Self {
        Self::EndpointDiscoveryTimeout {
            waited_ms: millis(deadline),
        }
    }

    /// No correlated reply for `method` (request `id`) within `deadline`.
    pub fn response_timeout(method: impl Into<String>, id: impl ToString, deadline: Duration) -> Self {
        Self::ResponseTimeout {
            method: method.into(),
            id: id.to_string(),
            waited_ms: millis(deadline),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::EndpointDiscoveryTimeout { .. } | Self::ResponseTimeout { .. } => {
                ErrorCategory::Timeout
            }
            Self::Transport { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Transport,
            },
            Self::Network(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Rpc { .. } => ErrorCategory::Rpc,
            Self::ProtocolDecode(_) | Self::Serialization(_) => ErrorCategory::Protocol,
            Self::SessionClosed | Self::Disconnected(_) => ErrorCategory::Session,
        }
    }

    /// Whether a caller could reasonably try the same operation again.
    ///
    /// The client itself never retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::EndpointDiscoveryTimeout { .. } | Self::Disconnected(_) => {
                return RecoverySuggestion::Reconnect
            }
            _ => {}
        }
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Network | ErrorCategory::Server => RecoverySuggestion::RetryLater,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Rpc => RecoverySuggestion::CheckRequest,
            ErrorCategory::Session => RecoverySuggestion::Reconnect,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, McpError>;

fn millis(deadline: Duration) -> u64 {
    u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX)
}
