//! Background read loop over the event stream.

use futures::StreamExt;
use reqwest::Response;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::correlation::CorrelationTable;
use crate::protocol::RpcReply;
use crate::sse::{SseDecoder, SseFrame};

/// Why the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListenerExit {
    Shutdown,
    Eof,
    Failed(String),
}

/// Read frames until the peer closes, the read fails, or `shutdown` fires.
///
/// Shutdown is observed while waiting for bytes and between frames, never
/// in the middle of one.
pub(crate) async fn run<F>(response: Response, shutdown: CancellationToken, mut on_frame: F) -> ListenerExit
where
    F: FnMut(SseFrame),
{
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return ListenerExit::Shutdown,
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for frame in decoder.push(&bytes) {
                    if shutdown.is_cancelled() {
                        return ListenerExit::Shutdown;
                    }
                    on_frame(frame);
                }
            }
            Some(Err(e)) => return ListenerExit::Failed(e.to_string()),
            None => {
                if let Some(frame) = decoder.finish() {
                    on_frame(frame);
                }
                return ListenerExit::Eof;
            }
        }
    }
}

/// Route a non-endpoint frame to the correlation table.
///
/// Objects with an `id` are replies; anything else is ignored. Replies for
/// unknown ids are discarded by the table.
pub(crate) fn deliver_frame(frame: &SseFrame, table: &CorrelationTable) {
    let data = frame.data.trim();
    if !data.starts_with('{') {
        return;
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "skipping undecodable stream frame");
            return;
        }
    };
    if value.get("id").is_none() {
        debug!(event = frame.event_name(), "ignoring server message without id");
        return;
    }
    match RpcReply::from_value(value) {
        Ok(reply) => {
            table.deliver(reply);
        }
        Err(e) => warn!(error = %e, "skipping malformed reply"),
    }
}
