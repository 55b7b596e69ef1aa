//! Session configuration (layered: explicit values > env > `.env` file).

pub mod http;

pub use http::{HttpSettings, ProxySettings, TlsVerification};

use std::time::Duration;

use bon::Builder;

use crate::auth::Credentials;
use crate::endpoint::{EndpointSource, ProtocolVariant};
use crate::error::{McpError, Result};

/// Deadlines applied by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct Timeouts {
    /// How long to wait for the server to announce its submission endpoint.
    #[builder(default = Duration::from_secs(10))]
    pub discovery: Duration,
    /// How long to wait for a correlated reply.
    #[builder(default = Duration::from_secs(30))]
    pub response: Duration,
    /// TCP/TLS connect phase of every outbound request.
    #[builder(default = Duration::from_secs(30))]
    pub connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything a session needs to connect.
#[derive(Debug, Clone)]
pub struct McpClientConfig {
    pub endpoint: EndpointSource,
    pub credentials: Credentials,
    pub variant: ProtocolVariant,
    pub timeouts: Timeouts,
    pub http: HttpSettings,
    /// Run a background stream for the fixed variant. Its frames are not used.
    pub keep_stream_warm: bool,
}

impl McpClientConfig {
    pub fn new(endpoint: EndpointSource, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            variant: ProtocolVariant::default(),
            timeouts: Timeouts::default(),
            http: HttpSettings::default(),
            keep_stream_warm: false,
        }
    }

    /// Load from `CELONIS_*` and `PROXY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ConfigParts::from_env().into_config()
    }

    pub fn with_variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    pub fn with_keep_stream_warm(mut self, warm: bool) -> Self {
        self.keep_stream_warm = warm;
        self
    }
}

/// Unvalidated configuration values from any one layer.
///
/// Layers are combined with [`ConfigParts::or`] and validated once by
/// [`ConfigParts::into_config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigParts {
    pub api_key: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub endpoint_url: Option<String>,
    pub team_url: Option<String>,
    pub server_id: Option<String>,
    pub variant: Option<String>,
    pub proxy: Option<ProxySettings>,
    pub tls: Option<TlsVerification>,
    pub timeouts: Option<Timeouts>,
    pub keep_stream_warm: bool,
}

const ENV_API_KEY: &str = "CELONIS_API_KEY";
const ENV_CLIENT_ID: &str = "CELONIS_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "CELONIS_CLIENT_SECRET";
const ENV_ENDPOINT_URL: &str = "CELONIS_ENDPOINT_URL";
const ENV_TEAM_URL: &str = "CELONIS_TEAM_URL";
const ENV_SERVER_ID: &str = "CELONIS_SERVER_ID";
const ENV_VARIANT: &str = "CELONIS_MCP_VARIANT";

impl ConfigParts {
    /// Read the environment, loading `.env` first if one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            api_key: var(ENV_API_KEY),
            client_id: var(ENV_CLIENT_ID),
            client_secret: var(ENV_CLIENT_SECRET),
            endpoint_url: var(ENV_ENDPOINT_URL),
            team_url: var(ENV_TEAM_URL),
            server_id: var(ENV_SERVER_ID),
            variant: var(ENV_VARIANT),
            proxy: proxy_from_env(var),
            tls: None,
            timeouts: None,
            keep_stream_warm: false,
        }
    }

    /// Fill every value missing here from `fallback`.
    pub fn or(self, fallback: ConfigParts) -> Self {
        Self {
            api_key: self.api_key.or(fallback.api_key),
            client_id: self.client_id.or(fallback.client_id),
            client_secret: self.client_secret.or(fallback.client_secret),
            endpoint_url: self.endpoint_url.or(fallback.endpoint_url),
            team_url: self.team_url.or(fallback.team_url),
            server_id: self.server_id.or(fallback.server_id),
            variant: self.variant.or(fallback.variant),
            proxy: self.proxy.or(fallback.proxy),
            tls: self.tls.or(fallback.tls),
            timeouts: self.timeouts.or(fallback.timeouts),
            keep_stream_warm: self.keep_stream_warm || fallback.keep_stream_warm,
        }
    }

    /// Validate into a usable configuration. No network access happens here.
    pub fn into_config(self) -> Result<McpClientConfig> {
        let endpoint = EndpointSource::from_parts(self.endpoint_url, self.team_url, self.server_id)?;
        let credentials = Credentials::from_parts(self.api_key, self.client_id, self.client_secret)
            .map_err(|_| {
                McpError::Configuration(
                    "missing credentials: provide an API key or a client id and secret".into(),
                )
            })?;
        let variant = match self.variant {
            Some(raw) => raw.trim().parse::<ProtocolVariant>().map_err(|_| {
                McpError::Configuration(format!(
                    "unknown protocol variant '{raw}' (expected discovered or fixed)"
                ))
            })?,
            None => ProtocolVariant::default(),
        };

        let mut http = HttpSettings::default();
        if let Some(proxy) = self.proxy {
            http = http.with_proxy(proxy);
        }
        if let Some(tls) = self.tls {
            http = http.with_tls(tls);
        }

        Ok(McpClientConfig::new(endpoint, credentials)
            .with_variant(variant)
            .with_timeouts(self.timeouts.unwrap_or_default())
            .with_http(http)
            .with_keep_stream_warm(self.keep_stream_warm))
    }
}

fn proxy_from_env(var: impl Fn(&str) -> Option<String>) -> Option<ProxySettings> {
    let mut proxy = match var("PROXY_URL") {
        Some(url) => ProxySettings::new(url),
        None => {
            let host = var("PROXY_HOST")?;
            let port = var("PROXY_PORT")?.trim().parse::<u16>().ok()?;
            ProxySettings::from_host_port(&host, port)
        }
    };
    if let Some(user) = var("PROXY_USER") {
        proxy = proxy.with_credentials(user, var("PROXY_PASS").unwrap_or_default());
    }
    Some(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> ConfigParts {
        ConfigParts {
            api_key: Some("key".into()),
            endpoint_url: Some("https://acme.celonis.cloud/mcp/sse".into()),
            ..Default::default()
        }
    }

    #[test]
    fn timeouts_default_to_reference_deadlines() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.discovery, Duration::from_secs(10));
        assert_eq!(timeouts.response, Duration::from_secs(30));
    }

    #[test]
    fn timeouts_builder_overrides_single_field() {
        let timeouts = Timeouts::builder()
            .response(Duration::from_millis(250))
            .build();
        assert_eq!(timeouts.response, Duration::from_millis(250));
        assert_eq!(timeouts.discovery, Duration::from_secs(10));
    }

    #[test]
    fn explicit_layer_wins_over_fallback() {
        let merged = parts().or(ConfigParts {
            api_key: Some("from-env".into()),
            variant: Some("fixed".into()),
            ..Default::default()
        });
        assert_eq!(merged.api_key.as_deref(), Some("key"));
        assert_eq!(merged.variant.as_deref(), Some("fixed"));
    }

    #[test]
    fn into_config_parses_variant() {
        let config = ConfigParts {
            variant: Some("streamable-http".into()),
            ..parts()
        }
        .into_config()
        .unwrap();
        assert_eq!(config.variant, ProtocolVariant::Fixed);
        assert!(matches!(config.credentials, Credentials::StaticToken(_)));
    }

    #[test]
    fn unknown_variant_is_configuration_error() {
        let err = ConfigParts {
            variant: Some("websocket".into()),
            ..parts()
        }
        .into_config()
        .unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));
    }

    #[test]
    fn missing_credentials_is_configuration_error() {
        let err = ConfigParts {
            api_key: None,
            ..parts()
        }
        .into_config()
        .unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));
    }

    #[test]
    fn proxy_assembled_from_host_and_port() {
        let vars = |name: &str| match name {
            "PROXY_HOST" => Some("proxy.corp".to_string()),
            "PROXY_PORT" => Some("3128".to_string()),
            "PROXY_USER" => Some("alice".to_string()),
            "PROXY_PASS" => Some("pw".to_string()),
            _ => None,
        };
        let proxy = proxy_from_env(vars).unwrap();
        assert_eq!(proxy.url, "http://proxy.corp:3128");
        assert_eq!(proxy.username.as_deref(), Some("alice"));
        assert_eq!(proxy.password.as_deref(), Some("pw"));
    }

    #[test]
    fn proxy_url_takes_precedence_over_host() {
        let vars = |name: &str| match name {
            "PROXY_URL" => Some("http://direct:8080".to_string()),
            "PROXY_HOST" => Some("ignored".to_string()),
            "PROXY_PORT" => Some("1".to_string()),
            _ => None,
        };
        assert_eq!(proxy_from_env(vars).unwrap().url, "http://direct:8080");
    }
}
