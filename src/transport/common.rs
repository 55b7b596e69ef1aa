use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, Url};
use tracing::debug;

use crate::auth::Token;
use crate::config::Timeouts;
use crate::error::{McpError, Result};
use crate::protocol::RpcRequest;

/// Accept header for the discovered-endpoint stream.
pub(crate) const ACCEPT_STREAM: &str = "text/event-stream";
/// Accept header the server dialect requires on submissions and the fixed stream.
pub(crate) const ACCEPT_DUAL: &str = "application/json, text/event-stream";

/// Per-connection state shared by both transport strategies.
#[derive(Debug, Clone)]
pub struct TransportContext {
    pub http: reqwest::Client,
    pub token: Token,
    pub stream_url: Url,
    pub timeouts: Timeouts,
    pub keep_stream_warm: bool,
}

impl TransportContext {
    fn headers(&self, accept: &'static str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        let mut auth = HeaderValue::from_str(&self.token.authorization_header()).map_err(|_| {
            McpError::Authentication(
                "access token contains characters not allowed in an HTTP header".into(),
            )
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Open the long-lived GET. No `Content-Type` is sent on this request.
    pub(crate) async fn open_stream(&self, accept: &'static str) -> Result<Response> {
        debug!(url = %self.stream_url, accept, "opening event stream");
        let resp = self
            .http
            .get(self.stream_url.clone())
            .headers(self.headers(accept)?)
            .send()
            .await?;
        ensure_success(resp).await
    }

    /// POST a request envelope to `url`.
    pub(crate) async fn post(&self, url: &Url, request: &RpcRequest) -> Result<Response> {
        debug!(id = %request.id, method = %request.method, %url, "posting request");
        let mut headers = self.headers(ACCEPT_DUAL)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let resp = self
            .http
            .post(url.clone())
            .headers(headers)
            .json(request)
            .send()
            .await?;
        ensure_success(resp).await
    }
}

/// Turn a non-2xx status into a transport error carrying whatever body was readable.
async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(McpError::transport(status.as_u16(), body))
}
