//! Session for invoking tools on an MCP server.

use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::auth;
use crate::config::McpClientConfig;
use crate::correlation::{CloseReason, CorrelationTable};
use crate::endpoint::token_url;
use crate::error::{McpError, Result};
use crate::protocol::RpcRequest;
use crate::transport::{self, McpTransport, TransportContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or the last attempt failed before the stream was usable.
    Idle,
    Connected,
    /// The stream ended after a successful connect. Calls fail until `connect()` runs again.
    Disconnected,
    Closed,
}

/// One logical connection to a server. Calls may run concurrently.
///
/// # Example
/// ```no_run
/// use celonis_mcp::prelude::*;
///
/// # async fn example() -> celonis_mcp::error::Result<()> {
/// let config = McpClientConfig::from_env()?;
/// let session = McpSession::new(config)?;
/// let tools = session.list_tools().await?;
/// let result = session
///     .call_tool("search", serde_json::json!({"query": "open invoices"}))
///     .await?;
/// session.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct McpSession {
    config: McpClientConfig,
    http: reqwest::Client,
    stream_url: Url,
    table: CorrelationTable,
    transport: OnceCell<Box<dyn McpTransport>>,
    connect_lock: Mutex<()>,
    ever_connected: AtomicBool,
    closed: AtomicBool,
}

impl McpSession {
    /// Validate the configuration and build the HTTP client. No network access.
    pub fn new(config: McpClientConfig) -> Result<Self> {
        let stream_url = config.endpoint.stream_url()?;
        let http = config.http.build_client(config.timeouts.connect)?;
        Ok(Self {
            config,
            http,
            stream_url,
            table: CorrelationTable::new(),
            transport: OnceCell::new(),
            connect_lock: Mutex::new(()),
            ever_connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    async fn transport(&self) -> Result<&dyn McpTransport> {
        let transport = self
            .transport
            .get_or_try_init(|| async {
                let token_url = token_url(&self.config.endpoint.base_url()?);
                let token = auth::resolve(&self.config.credentials, &self.http, &token_url).await?;
                debug!(variant = %self.config.variant, "credentials resolved");
                let ctx = TransportContext {
                    http: self.http.clone(),
                    token,
                    stream_url: self.stream_url.clone(),
                    timeouts: self.config.timeouts,
                    keep_stream_warm: self.config.keep_stream_warm,
                };
                Ok::<_, McpError>(transport::for_variant(self.config.variant, ctx, self.table.clone()))
            })
            .await?;
        Ok(transport.as_ref())
    }

    /// Resolve credentials (once) and bring the transport up.
    ///
    /// Also the way to recover after a discovery timeout or a dropped stream.
    pub async fn connect(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::SessionClosed);
        }
        let _guard = self.connect_lock.lock().await;
        let transport = self.transport().await?;
        if transport.is_connected() {
            return Ok(());
        }
        transport.connect().await?;
        self.ever_connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Send one JSON-RPC request and return its `result`.
    pub async fn invoke(&self, method: &str, params: Option<Value>) -> Result<Value> {
        match self.state() {
            ConnectionState::Closed => return Err(McpError::SessionClosed),
            ConnectionState::Idle => self.connect().await?,
            ConnectionState::Connected | ConnectionState::Disconnected => {}
        }
        let transport = self.transport().await?;
        if !transport.is_connected() {
            if self.closed.load(Ordering::SeqCst) {
                return Err(McpError::SessionClosed);
            }
            return Err(McpError::Disconnected(
                "session lost its stream; call connect() again".into(),
            ));
        }

        let request = RpcRequest::new(method, params);
        debug!(id = %request.id, method, "invoking");
        transport.send(request).await?.into_result()
    }

    /// The server's tool catalog, passed through verbatim.
    pub async fn list_tools(&self) -> Result<Value> {
        self.invoke("tools/list", None).await
    }

    /// Call a tool by name and return its result verbatim.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.invoke(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    /// Stop the stream and fail outstanding calls with `SessionClosed`. Idempotent.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(transport) = self.transport.get() {
            transport.close().await;
        }
        self.table.close_all(CloseReason::Shutdown);
        info!(stream = %self.stream_url, "session shut down");
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::SeqCst) {
            return ConnectionState::Closed;
        }
        if !self.ever_connected.load(Ordering::SeqCst) {
            return ConnectionState::Idle;
        }
        match self.transport.get() {
            Some(transport) if transport.is_connected() => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Calls registered and still waiting for a reply on the stream.
    pub fn pending_calls(&self) -> usize {
        self.table.len()
    }
}
