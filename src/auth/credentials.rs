use std::fmt;

use async_trait::async_trait;

use super::client_credentials::ClientCredentialsProvider;
use super::error::AuthError;
use super::token::Token;

/// How the session authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Application key used directly as the bearer token.
    StaticToken(String),
    /// OAuth2 client-credentials pair exchanged for an access token.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    /// Pick credentials from optional parts. A static key wins over a client pair.
    pub fn from_parts(
        api_key: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Self, AuthError> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match (present(api_key), present(client_id), present(client_secret)) {
            (Some(key), _, _) => Ok(Self::StaticToken(key)),
            (None, Some(client_id), Some(client_secret)) => Ok(Self::ClientCredentials {
                client_id,
                client_secret,
            }),
            _ => Err(AuthError::MissingCredentials),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaticToken(_) => f.debug_tuple("StaticToken").field(&"<redacted>").finish(),
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Source of a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<Token, AuthError>;
}

/// Returns a fixed token unchanged.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<Token, AuthError> {
        Ok(Token::bearer(self.token.clone()))
    }
}

/// Resolve credentials into a token. Single attempt, no retry.
pub async fn resolve(
    credentials: &Credentials,
    http: &reqwest::Client,
    token_url: &str,
) -> Result<Token, AuthError> {
    match credentials {
        Credentials::StaticToken(token) => StaticTokenProvider::new(token.clone()).token().await,
        Credentials::ClientCredentials {
            client_id,
            client_secret,
        } => {
            ClientCredentialsProvider::new(http.clone(), token_url, client_id, client_secret)
                .token()
                .await
        }
    }
}
