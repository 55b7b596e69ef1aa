//! Transport strategies for the two server dialects.

use async_trait::async_trait;

use crate::correlation::CorrelationTable;
use crate::endpoint::ProtocolVariant;
use crate::error::Result;
use crate::protocol::{RpcReply, RpcRequest};

mod common;
mod inline;
mod listener;
mod sse;

pub use common::TransportContext;
pub use inline::InlineTransport;
pub use sse::SseTransport;

/// How requests reach the server and how replies come back.
///
/// Implementations take `&self` so one transport can serve concurrent calls.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Make the transport ready to send. Safe to call again after a failure.
    async fn connect(&self) -> Result<()>;

    /// Transmit a request and return its correlated reply.
    async fn send(&self, request: RpcRequest) -> Result<RpcReply>;

    /// Release the connection and fail outstanding calls. Idempotent.
    async fn close(&self);

    fn is_connected(&self) -> bool;
}

/// Pick the strategy for `variant`. Replies on the stream go through `table`.
pub fn for_variant(
    variant: ProtocolVariant,
    ctx: TransportContext,
    table: CorrelationTable,
) -> Box<dyn McpTransport> {
    match variant {
        ProtocolVariant::Discovered => Box::new(SseTransport::new(ctx, table)),
        ProtocolVariant::Fixed => Box::new(InlineTransport::new(ctx)),
    }
}
