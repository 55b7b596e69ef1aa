//! Correlation of replies with in-flight requests.
//!
//! Every entry is removed exactly once, under the table lock, by whichever
//! of delivery, cancellation, or close gets there first. Delivery sends into
//! the call's channel while still holding the lock, so a caller that fails
//! to remove its own entry knows the outcome is already waiting for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{McpError, Result};
use crate::protocol::{RequestId, RpcReply};

type Outcome = Result<RpcReply>;

/// Why outstanding calls are being failed in bulk.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// The session was shut down by its owner.
    Shutdown,
    /// The stream listener stopped.
    Disconnected(String),
}

impl CloseReason {
    fn to_error(&self) -> McpError {
        match self {
            Self::Shutdown => McpError::SessionClosed,
            Self::Disconnected(reason) => McpError::Disconnected(reason.clone()),
        }
    }
}

/// Concurrent map from request id to the waiting caller.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<Outcome>>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Outcome>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a waiter for `id`. Must happen before the request is transmitted.
    pub fn register(&self, id: RequestId) -> Result<PendingCall> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        if pending.contains_key(&id) {
            return Err(McpError::Configuration(format!(
                "request id {id} is already in flight"
            )));
        }
        pending.insert(id.clone(), tx);
        Ok(PendingCall {
            id,
            rx,
            table: self.clone(),
        })
    }

    /// Hand a reply to its waiter. Returns `false` for unknown or stale ids.
    pub fn deliver(&self, reply: RpcReply) -> bool {
        let Some(id) = reply.request_id() else {
            debug!("discarding reply without a usable id");
            return false;
        };
        let mut pending = self.lock();
        match pending.remove(&id) {
            Some(tx) => {
                if tx.send(Ok(reply)).is_err() {
                    debug!(%id, "waiter went away before its reply arrived");
                }
                true
            }
            None => {
                debug!(%id, "discarding reply for unknown or expired request");
                false
            }
        }
    }

    /// Remove the entry for `id`. Returns `true` if this call removed it.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Fail every outstanding call. Returns how many were failed.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(reason.to_error()));
        }
        if count > 0 {
            warn!(count, ?reason, "failed outstanding calls");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// A registered, not yet answered call.
///
/// Dropping it removes the table entry, so an abandoned call cannot leak.
pub struct PendingCall {
    id: RequestId,
    rx: oneshot::Receiver<Outcome>,
    table: CorrelationTable,
}

impl PendingCall {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the reply, up to `deadline`.
    ///
    /// On timeout the entry is removed before returning; if a delivery won
    /// the race in the meantime, its reply is returned instead.
    pub async fn wait(mut self, deadline: Duration) -> std::result::Result<RpcReply, WaitError> {
        match tokio::time::timeout(deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome.map_err(WaitError::Failed),
            Ok(Err(_)) => Err(WaitError::Failed(McpError::SessionClosed)),
            Err(_) => {
                if self.table.cancel(&self.id) {
                    return Err(WaitError::TimedOut);
                }
                match self.rx.try_recv() {
                    Ok(outcome) => outcome.map_err(WaitError::Failed),
                    Err(_) => Err(WaitError::TimedOut),
                }
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.table.cancel(&self.id);
    }
}

/// Why a pending call produced no reply.
#[derive(Debug)]
pub enum WaitError {
    TimedOut,
    Failed(McpError),
}
