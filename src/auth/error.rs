use thiserror::Error;

use crate::error::McpError;

/// Credential resolution failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credentials: provide an API key or an OAuth client id and secret")]
    MissingCredentials,
    #[error("Token endpoint returned status {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("Invalid token response ({message}): {body}")]
    InvalidResponse { message: String, body: String },
    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<AuthError> for McpError {
    fn from(error: AuthError) -> Self {
        McpError::Authentication(error.to_string())
    }
}
