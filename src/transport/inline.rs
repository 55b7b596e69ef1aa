//! Fixed-endpoint strategy: each reply comes back in its POST response body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::common::{TransportContext, ACCEPT_DUAL};
use super::listener::{self, ListenerExit};
use super::McpTransport;
use crate::error::{McpError, Result};
use crate::protocol::{reply_from_body, RpcReply, RpcRequest};

/// Requests are posted to the stream URL itself; no discovery wait.
pub struct InlineTransport {
    ctx: TransportContext,
    connected: AtomicBool,
    shutdown: CancellationToken,
    warm_stream: Mutex<Option<JoinHandle<()>>>,
}

impl InlineTransport {
    pub fn new(ctx: TransportContext) -> Self {
        Self {
            ctx,
            connected: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            warm_stream: Mutex::new(None),
        }
    }

    fn warm_stream(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.warm_stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keep a GET open in the background. Its frames are only logged.
    async fn start_warm_stream(&self) -> Result<()> {
        let response = self.ctx.open_stream(ACCEPT_DUAL).await?;
        let shutdown = self.shutdown.child_token();
        let task = tokio::spawn(async move {
            let exit = listener::run(response, shutdown, |frame| {
                debug!(event = frame.event_name(), "discarding frame from warm stream");
            })
            .await;
            if exit != ListenerExit::Shutdown {
                warn!(?exit, "warm stream ended; requests are unaffected");
            }
        });
        *self.warm_stream() = Some(task);
        Ok(())
    }

    async fn exchange(&self, request: &RpcRequest) -> Result<RpcReply> {
        let resp = self.ctx.post(&self.ctx.stream_url, request).await?;
        let body = resp.text().await?;
        reply_from_body(&body, &request.id)
    }
}

#[async_trait]
impl McpTransport for InlineTransport {
    async fn connect(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(McpError::SessionClosed);
        }
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let needs_warm_stream = self.ctx.keep_stream_warm && self.warm_stream().is_none();
        if needs_warm_stream {
            self.start_warm_stream().await?;
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(endpoint = %self.ctx.stream_url, "session connected");
        Ok(())
    }

    async fn send(&self, request: RpcRequest) -> Result<RpcReply> {
        if self.shutdown.is_cancelled() {
            return Err(McpError::SessionClosed);
        }

        let deadline = self.ctx.timeouts.response;
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(McpError::SessionClosed),
            outcome = tokio::time::timeout(deadline, self.exchange(&request)) => match outcome {
                Ok(reply) => reply,
                Err(_) => Err(McpError::response_timeout(&request.method, &request.id, deadline)),
            },
        }
    }

    async fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.connected.store(false, Ordering::SeqCst);
        let handle = self.warm_stream().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("session closed");
    }

    fn is_connected(&self) -> bool {
        !self.shutdown.is_cancelled() && self.connected.load(Ordering::SeqCst)
    }
}
