use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::credentials::TokenProvider;
use super::error::AuthError;
use super::token::Token;

/// Scope the MCP server requires for tool execution.
pub const REQUIRED_SCOPE: &str = "mcp-asset.tools:execute";

/// OAuth2 client-credentials grant against a token endpoint.
///
/// # Example
/// ```no_run
/// use celonis_mcp::auth::{ClientCredentialsProvider, TokenProvider};
///
/// # async fn example() -> Result<(), celonis_mcp::auth::AuthError> {
/// let provider = ClientCredentialsProvider::new(
///     reqwest::Client::new(),
///     "https://acme.celonis.cloud/oauth2/token",
///     "client-id",
///     "client-secret",
/// );
/// let token = provider.token().await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientCredentialsProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientCredentialsProvider {
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: REQUIRED_SCOPE.to_string(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Perform the exchange once.
    pub async fn exchange(&self) -> Result<Token, AuthError> {
        debug!(url = %self.token_url, "requesting client-credentials token");
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = status.as_u16(), "token exchange rejected");
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::InvalidResponse {
                message: e.to_string(),
                body: body.clone(),
            })?;
        if payload.access_token.trim().is_empty() {
            return Err(AuthError::InvalidResponse {
                message: "empty access_token".into(),
                body,
            });
        }

        Ok(Token {
            access_token: payload.access_token,
            token_type: payload.token_type,
            expires_at: payload
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
            scopes: payload
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect()),
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn token(&self) -> Result<Token, AuthError> {
        self.exchange().await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}
