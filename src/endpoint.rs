//! Stream URL derivation and submission endpoint discovery.

use reqwest::Url;
use strum::{Display, EnumString};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{McpError, Result};

/// Query marker requesting the published (non-draft) server.
pub const DRAFT_MARKER: &str = "draft=false";

const TEAM_SERVER_PATH: &str = "/studio-copilot/api/v1/mcp-servers/mcp";

/// Server dialect, chosen once per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ProtocolVariant {
    /// The stream announces a separate submission endpoint; replies arrive on the stream.
    #[default]
    #[strum(to_string = "discovered", serialize = "sse")]
    Discovered,
    /// Requests are posted to the stream URL; replies come back in the POST body.
    #[strum(to_string = "fixed", serialize = "streamable-http")]
    Fixed,
}

/// Where the stream URL comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    /// Fully qualified server URL.
    Url(String),
    /// Team URL plus MCP server id.
    Team { team_url: String, server_id: String },
}

impl EndpointSource {
    /// Pick a source from optional parts. An explicit URL wins over the team pair.
    ///
    /// Blank values count as missing.
    pub fn from_parts(
        url: Option<String>,
        team_url: Option<String>,
        server_id: Option<String>,
    ) -> Result<Self> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match (present(url), present(team_url), present(server_id)) {
            (Some(url), _, _) => Ok(Self::Url(url.trim().to_string())),
            (None, Some(team_url), Some(server_id)) => Ok(Self::Team {
                team_url: team_url.trim().to_string(),
                server_id: server_id.trim().to_string(),
            }),
            _ => Err(McpError::Configuration(
                "missing endpoint details: provide an endpoint URL or both a team URL and a server id"
                    .into(),
            )),
        }
    }

    /// Canonical stream URL, with the draft marker added when no query is present.
    pub fn stream_url(&self) -> Result<Url> {
        match self {
            Self::Url(raw) => {
                let mut url = parse_url(raw)?;
                if url.query().is_none() {
                    url.set_query(Some(DRAFT_MARKER));
                }
                Ok(url)
            }
            Self::Team {
                team_url,
                server_id,
            } => {
                let base = team_url.trim_end_matches('/');
                parse_url(&format!(
                    "{base}{TEAM_SERVER_PATH}/{server_id}?{DRAFT_MARKER}"
                ))
            }
        }
    }

    /// Scheme and authority the token endpoint hangs off.
    pub fn base_url(&self) -> Result<String> {
        match self {
            Self::Url(raw) => Ok(parse_url(raw)?.origin().ascii_serialization()),
            Self::Team { team_url, .. } => {
                parse_url(team_url)?;
                Ok(team_url.trim_end_matches('/').to_string())
            }
        }
    }
}

/// OAuth2 token endpoint for a base URL.
pub fn token_url(base: &str) -> String {
    format!("{}/oauth2/token", base.trim_end_matches('/'))
}

/// Whether unnamed frame data looks like an endpoint announcement.
pub fn looks_like_endpoint(data: &str) -> bool {
    let data = data.trim();
    data.starts_with('/') || data.starts_with("http")
}

/// Resolve an announced path or absolute URL against the stream URL.
pub fn resolve_announced(stream_url: &Url, data: &str) -> Result<Url> {
    let data = data.trim();
    if data.starts_with("http://") || data.starts_with("https://") {
        return Url::parse(data)
            .map_err(|e| McpError::ProtocolDecode(format!("bad endpoint URL '{data}': {e}")));
    }
    stream_url.join(data).map_err(|e| {
        McpError::ProtocolDecode(format!(
            "cannot resolve endpoint '{data}' against {stream_url}: {e}"
        ))
    })
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| McpError::Configuration(format!("invalid URL '{raw}': {e}")))
}

/// Write-once holder for the submission endpoint.
///
/// The first publication wins; later announcements are ignored.
#[derive(Debug, Clone)]
pub struct SubmissionSlot {
    tx: watch::Sender<Option<Url>>,
}

impl Default for SubmissionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// A slot that already holds its endpoint.
    pub fn known(url: Url) -> Self {
        let (tx, _rx) = watch::channel(Some(url));
        Self { tx }
    }

    /// Store the endpoint. Returns `false` when one was already published.
    pub fn publish(&self, url: Url) -> bool {
        let accepted = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(url.clone());
            true
        });
        if accepted {
            debug!(endpoint = %url, "submission endpoint discovered");
        } else {
            warn!(ignored = %url, "ignoring repeated endpoint announcement");
        }
        accepted
    }

    pub fn get(&self) -> Option<Url> {
        self.tx.borrow().clone()
    }

    /// Wait until an endpoint is published or `deadline` elapses.
    pub async fn wait(&self, deadline: std::time::Duration) -> Result<Url> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(deadline, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(url)) => url
                .clone()
                .ok_or_else(|| McpError::discovery_timeout(deadline)),
            Ok(Err(_)) => Err(McpError::SessionClosed),
            Err(_) => Err(McpError::discovery_timeout(deadline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn explicit_url_gets_draft_marker() {
        let source = EndpointSource::Url("https://acme.celonis.cloud/mcp/abc".into());
        assert_eq!(
            source.stream_url().unwrap().as_str(),
            "https://acme.celonis.cloud/mcp/abc?draft=false"
        );
    }

    #[test]
    fn explicit_url_with_query_is_left_alone() {
        let source = EndpointSource::Url("https://acme.celonis.cloud/mcp/abc?draft=true".into());
        assert_eq!(
            source.stream_url().unwrap().as_str(),
            "https://acme.celonis.cloud/mcp/abc?draft=true"
        );
    }

    #[test]
    fn team_pair_builds_server_path() {
        let source = EndpointSource::Team {
            team_url: "https://acme.celonis.cloud/".into(),
            server_id: "srv-42".into(),
        };
        assert_eq!(
            source.stream_url().unwrap().as_str(),
            "https://acme.celonis.cloud/studio-copilot/api/v1/mcp-servers/mcp/srv-42?draft=false"
        );
        assert_eq!(source.base_url().unwrap(), "https://acme.celonis.cloud");
    }

    #[test]
    fn base_url_keeps_non_default_port() {
        let source = EndpointSource::Url("http://127.0.0.1:8080/sse".into());
        assert_eq!(source.base_url().unwrap(), "http://127.0.0.1:8080");
        assert_eq!(
            token_url(&source.base_url().unwrap()),
            "http://127.0.0.1:8080/oauth2/token"
        );
    }

    #[test]
    fn missing_parts_is_configuration_error() {
        let err = EndpointSource::from_parts(None, Some("https://team".into()), None).unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));

        let err = EndpointSource::from_parts(Some("  ".into()), None, None).unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));
    }

    #[test]
    fn explicit_url_wins_over_team_pair() {
        let source = EndpointSource::from_parts(
            Some("https://a/sse".into()),
            Some("https://team".into()),
            Some("id".into()),
        )
        .unwrap();
        assert_eq!(source, EndpointSource::Url("https://a/sse".into()));
    }

    #[test]
    fn relative_announcement_resolves_against_stream_host() {
        let stream = Url::parse("https://host/sse").unwrap();
        let resolved = resolve_announced(&stream, "/rpc/abc123").unwrap();
        assert_eq!(resolved.as_str(), "https://host/rpc/abc123");
    }

    #[test]
    fn absolute_announcement_is_taken_verbatim() {
        let stream = Url::parse("https://host/sse").unwrap();
        let resolved = resolve_announced(&stream, " https://other/messages?session=1 ").unwrap();
        assert_eq!(resolved.as_str(), "https://other/messages?session=1");
    }

    #[test]
    fn variant_parses_aliases() {
        assert_eq!("sse".parse::<ProtocolVariant>().unwrap(), ProtocolVariant::Discovered);
        assert_eq!("Fixed".parse::<ProtocolVariant>().unwrap(), ProtocolVariant::Fixed);
        assert_eq!(
            "streamable-http".parse::<ProtocolVariant>().unwrap(),
            ProtocolVariant::Fixed
        );
        assert!("carrier-pigeon".parse::<ProtocolVariant>().is_err());
    }

    #[test]
    fn slot_is_first_write_wins() {
        let slot = SubmissionSlot::new();
        assert!(slot.publish(Url::parse("https://host/a").unwrap()));
        assert!(!slot.publish(Url::parse("https://host/b").unwrap()));
        assert_eq!(slot.get().unwrap().as_str(), "https://host/a");
    }

    #[tokio::test(start_paused = true)]
    async fn slot_wait_times_out() {
        let slot = SubmissionSlot::new();
        let err = slot.wait(Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, McpError::EndpointDiscoveryTimeout { waited_ms: 10_000 }));
    }

    #[tokio::test]
    async fn slot_wait_sees_later_publication() {
        let slot = SubmissionSlot::new();
        let publisher = slot.clone();
        tokio::spawn(async move {
            publisher.publish(Url::parse("https://host/rpc").unwrap());
        });
        let url = slot.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(url.as_str(), "https://host/rpc");
    }
}
