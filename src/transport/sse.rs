//! Discovered-endpoint strategy: replies arrive on the event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::Url;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::common::{TransportContext, ACCEPT_STREAM};
use super::listener::{self, ListenerExit};
use super::McpTransport;
use crate::correlation::{CloseReason, CorrelationTable, WaitError};
use crate::endpoint::{looks_like_endpoint, resolve_announced, SubmissionSlot};
use crate::error::{McpError, Result};
use crate::protocol::{RpcReply, RpcRequest};
use crate::sse::SseFrame;

#[derive(Default)]
struct Connection {
    slot: SubmissionSlot,
    shutdown: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

/// Server announces a submission endpoint on the stream, then answers there.
pub struct SseTransport {
    ctx: TransportContext,
    table: CorrelationTable,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    closing: CancellationToken,
    conn: Mutex<Connection>,
}

impl SseTransport {
    pub fn new(ctx: TransportContext, table: CorrelationTable) -> Self {
        Self {
            ctx,
            table,
            connected: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            closing: CancellationToken::new(),
            conn: Mutex::new(Connection::default()),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::SessionClosed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(McpError::Disconnected(
                "event stream is not running; call connect() again".into(),
            ));
        }
        Ok(())
    }

    /// Stop the current listener, if any, and return its handle.
    fn stop_listener(&self) -> Option<JoinHandle<()>> {
        let mut conn = self.conn();
        conn.shutdown.cancel();
        self.connected.store(false, Ordering::SeqCst);
        conn.listener.take()
    }

    async fn start_listener(&self) -> Result<SubmissionSlot> {
        if let Some(previous) = self.stop_listener() {
            let _ = previous.await;
        }

        let response = self.ctx.open_stream(ACCEPT_STREAM).await?;
        let slot = SubmissionSlot::new();
        let shutdown = CancellationToken::new();
        self.connected.store(true, Ordering::SeqCst);

        let task = {
            let stream_url = self.ctx.stream_url.clone();
            let slot = slot.clone();
            let table = self.table.clone();
            let connected = Arc::clone(&self.connected);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let exit = listener::run(response, shutdown, |frame| {
                    handle_frame(&frame, &stream_url, &slot, &table)
                })
                .await;
                connected.store(false, Ordering::SeqCst);
                match exit {
                    ListenerExit::Shutdown => debug!("event stream listener stopped"),
                    ListenerExit::Eof => {
                        warn!("event stream closed by server");
                        table.close_all(CloseReason::Disconnected(
                            "event stream closed by server".into(),
                        ));
                    }
                    ListenerExit::Failed(reason) => {
                        warn!(%reason, "event stream read failed");
                        table.close_all(CloseReason::Disconnected(reason));
                    }
                }
            })
        };

        let mut conn = self.conn();
        conn.slot = slot.clone();
        conn.shutdown = shutdown;
        conn.listener = Some(task);
        Ok(slot)
    }

    fn submission_endpoint(&self) -> Option<Url> {
        self.conn().slot.get()
    }
}

fn handle_frame(frame: &SseFrame, stream_url: &Url, slot: &SubmissionSlot, table: &CorrelationTable) {
    let announces_endpoint = frame.event_name() == "endpoint"
        || (frame.event.is_none() && looks_like_endpoint(&frame.data));
    if announces_endpoint {
        match resolve_announced(stream_url, &frame.data) {
            Ok(url) => {
                slot.publish(url);
            }
            Err(e) => warn!(error = %e, "ignoring unusable endpoint announcement"),
        }
        return;
    }
    listener::deliver_frame(frame, table);
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn connect(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::SessionClosed);
        }
        if self.connected.load(Ordering::SeqCst) && self.submission_endpoint().is_some() {
            return Ok(());
        }

        let slot = self.start_listener().await?;
        match slot.wait(self.ctx.timeouts.discovery).await {
            Ok(endpoint) => {
                info!(stream = %self.ctx.stream_url, %endpoint, "session connected");
                Ok(())
            }
            Err(e) => {
                // No POST may be sent without an endpoint; drop the stream so a
                // later connect() starts clean.
                if let Some(handle) = self.stop_listener() {
                    let _ = handle.await;
                }
                Err(e)
            }
        }
    }

    async fn send(&self, request: RpcRequest) -> Result<RpcReply> {
        self.ensure_open()?;
        let endpoint = match self.submission_endpoint() {
            Some(url) => url,
            None => {
                let slot = self.conn().slot.clone();
                slot.wait(self.ctx.timeouts.discovery).await?
            }
        };

        let pending = self.table.register(request.id.clone())?;
        // A listener that died before registration has already drained the table.
        self.ensure_open()?;

        // One deadline covers the submission and the reply; a stalled POST
        // must not outlive it or the session.
        let deadline = self.ctx.timeouts.response;
        let exchange = async {
            let started = Instant::now();
            let resp = self.ctx.post(&endpoint, &request).await?;
            debug!(id = %request.id, status = resp.status().as_u16(), "request accepted");
            drop(resp);

            let remaining = deadline.saturating_sub(started.elapsed());
            pending.wait(remaining).await.map_err(|e| match e {
                WaitError::TimedOut => {
                    McpError::response_timeout(&request.method, &request.id, deadline)
                }
                WaitError::Failed(e) => e,
            })
        };

        tokio::select! {
            _ = self.closing.cancelled() => Err(McpError::SessionClosed),
            outcome = tokio::time::timeout(deadline, exchange) => outcome.unwrap_or_else(|_| {
                Err(McpError::response_timeout(&request.method, &request.id, deadline))
            }),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closing.cancel();
        let handle = self.stop_listener();
        self.table.close_all(CloseReason::Shutdown);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("session closed");
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connected.load(Ordering::SeqCst)
    }
}
