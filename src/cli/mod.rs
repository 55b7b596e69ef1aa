//! Command-line front end: list tools or call one, then print the JSON result.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use serde_json::Value;

use crate::client::McpSession;
use crate::config::{ConfigParts, ProxySettings, Timeouts, TlsVerification};
use crate::endpoint::ProtocolVariant;
use crate::error::{McpError, Result};

/// Invoke tools on a Celonis MCP server.
#[derive(Parser, Debug)]
#[command(name = "celonis-mcp", version, about = "Invoke tools on a Celonis MCP server")]
pub struct Cli {
    /// Application key used as the bearer token
    #[arg(long, conflicts_with = "oauth")]
    pub api_key: Option<String>,

    /// OAuth client credentials
    #[arg(long, num_args = 2, value_names = ["CLIENT_ID", "CLIENT_SECRET"])]
    pub oauth: Option<Vec<String>>,

    /// Full MCP server URL
    #[arg(long, conflicts_with = "team_info")]
    pub endpoint_url: Option<String>,

    /// Team URL and MCP server id
    #[arg(long, num_args = 2, value_names = ["TEAM_URL", "SERVER_ID"])]
    pub team_info: Option<Vec<String>>,

    /// Server dialect: discovered (sse) or fixed (streamable-http)
    #[arg(long)]
    pub variant: Option<ProtocolVariant>,

    /// Forward proxy URL
    #[arg(long, conflicts_with = "proxy_host")]
    pub proxy_url: Option<String>,

    /// Forward proxy host (used with --proxy-port)
    #[arg(long, requires = "proxy_port")]
    pub proxy_host: Option<String>,

    #[arg(long, requires = "proxy_host")]
    pub proxy_port: Option<u16>,

    #[arg(long)]
    pub proxy_user: Option<String>,

    #[arg(long, requires = "proxy_user")]
    pub proxy_pass: Option<String>,

    /// Disable TLS certificate verification
    #[arg(long, conflicts_with = "ca_bundle")]
    pub no_verify: bool,

    /// Extra PEM root certificate to trust
    #[arg(long)]
    pub ca_bundle: Option<PathBuf>,

    /// Keep a background stream open for the fixed dialect
    #[arg(long)]
    pub keep_stream_warm: bool,

    #[arg(long, value_enum, default_value_t = Action::List)]
    pub action: Action,

    /// Tool to call (required for --action call)
    #[arg(long)]
    pub tool_name: Option<String>,

    /// Tool arguments as a JSON object
    #[arg(long)]
    pub tool_args: Option<String>,

    /// Seconds to wait for the submission endpoint
    #[arg(long)]
    pub discovery_timeout: Option<u64>,

    /// Seconds to wait for each reply
    #[arg(long)]
    pub response_timeout: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Call,
}

/// What the session should do once connected.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListTools,
    CallTool { name: String, arguments: Value },
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the action flags before any network access.
    pub fn request(&self) -> Result<Request> {
        match self.action {
            Action::List => Ok(Request::ListTools),
            Action::Call => {
                let name = self
                    .tool_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| {
                        McpError::Configuration("--tool-name is required for --action call".into())
                    })?;
                let arguments = match &self.tool_args {
                    Some(raw) => {
                        let value: Value = serde_json::from_str(raw).map_err(|e| {
                            McpError::Configuration(format!("--tool-args is not valid JSON: {e}"))
                        })?;
                        if !value.is_object() {
                            return Err(McpError::Configuration(
                                "--tool-args must be a JSON object".into(),
                            ));
                        }
                        value
                    }
                    None => Value::Object(Default::default()),
                };
                Ok(Request::CallTool { name, arguments })
            }
        }
    }

    /// Configuration values given on the command line.
    pub fn config_parts(&self) -> ConfigParts {
        let (client_id, client_secret) = pair(self.oauth.as_deref());
        let (team_url, server_id) = pair(self.team_info.as_deref());

        let proxy = match (&self.proxy_url, &self.proxy_host, self.proxy_port) {
            (Some(url), _, _) => Some(ProxySettings::new(url.clone())),
            (None, Some(host), Some(port)) => Some(ProxySettings::from_host_port(host, port)),
            _ => None,
        }
        .map(|proxy| match &self.proxy_user {
            Some(user) => proxy.with_credentials(user.clone(), self.proxy_pass.clone().unwrap_or_default()),
            None => proxy,
        });

        let tls = if self.no_verify {
            Some(TlsVerification::Insecure)
        } else {
            self.ca_bundle.clone().map(TlsVerification::CaBundle)
        };

        let timeouts = (self.discovery_timeout.is_some() || self.response_timeout.is_some()).then(|| {
            Timeouts::builder()
                .maybe_discovery(self.discovery_timeout.map(Duration::from_secs))
                .maybe_response(self.response_timeout.map(Duration::from_secs))
                .build()
        });

        ConfigParts {
            api_key: self.api_key.clone(),
            client_id,
            client_secret,
            endpoint_url: self.endpoint_url.clone(),
            team_url,
            server_id,
            variant: self.variant.map(|v| v.to_string()),
            proxy,
            tls,
            timeouts,
            keep_stream_warm: self.keep_stream_warm,
        }
    }
}

fn pair(values: Option<&[String]>) -> (Option<String>, Option<String>) {
    match values {
        Some([first, second]) => (Some(first.clone()), Some(second.clone())),
        _ => (None, None),
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "celonis_mcp=debug,info",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Run one action against the configured server and return its JSON result.
///
/// Flags take precedence over `CELONIS_*`/`PROXY_*` environment variables.
pub async fn run(cli: Cli) -> Result<Value> {
    let request = cli.request()?;
    let config = cli.config_parts().or(ConfigParts::from_env()).into_config()?;
    let session = McpSession::new(config)?;

    let outcome = match request {
        Request::ListTools => session.list_tools().await,
        Request::CallTool { name, arguments } => session.call_tool(&name, arguments).await,
    };
    session.shutdown().await;
    outcome
}
