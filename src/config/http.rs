//! Outbound HTTP settings shared by every request a session makes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Certificate, Proxy};
use tracing::warn;

use crate::error::{McpError, Result};

/// Forward proxy with optional basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Build a proxy from host and port. Bare hosts get an `http://` scheme.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        let host = host.trim().trim_end_matches('/');
        if host.contains("://") {
            Self::new(format!("{host}:{port}"))
        } else {
            Self::new(format!("http://{host}:{port}"))
        }
    }

    fn to_proxy(&self) -> Result<Proxy> {
        let proxy = Proxy::all(&self.url).map_err(|e| {
            McpError::Configuration(format!("invalid proxy URL '{}': {e}", self.url))
        })?;
        Ok(match &self.username {
            Some(user) => proxy.basic_auth(user, self.password.as_deref().unwrap_or_default()),
            None => proxy,
        })
    }
}

impl fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Server certificate checking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    #[default]
    Verify,
    /// Accept any certificate.
    Insecure,
    /// Trust an extra PEM root certificate.
    CaBundle(PathBuf),
}

/// Proxy, TLS, and client identity for outbound requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpSettings {
    pub proxy: Option<ProxySettings>,
    pub tls: TlsVerification,
    pub user_agent: Option<String>,
}

impl HttpSettings {
    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_tls(mut self, tls: TlsVerification) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the client used for the token exchange, the stream, and every POST.
    ///
    /// Only the connect phase is bounded; the stream response stays open indefinitely.
    pub fn build_client(&self, connect_timeout: Duration) -> Result<reqwest::Client> {
        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| concat!("celonis-mcp/", env!("CARGO_PKG_VERSION")).to_string());
        let mut builder = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent);

        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.to_proxy()?);
        }

        match &self.tls {
            TlsVerification::Verify => {}
            TlsVerification::Insecure => {
                warn!("TLS certificate verification is disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
            TlsVerification::CaBundle(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    McpError::Configuration(format!(
                        "cannot read CA bundle {}: {e}",
                        path.display()
                    ))
                })?;
                let cert = Certificate::from_pem(&pem).map_err(|e| {
                    McpError::Configuration(format!(
                        "invalid CA bundle {}: {e}",
                        path.display()
                    ))
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        builder
            .build()
            .map_err(|e| McpError::Configuration(format!("cannot build HTTP client: {e}")))
    }
}
