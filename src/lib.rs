//! celonis-mcp: JSON-RPC tool invocation for Celonis MCP servers
//!
//! A session authenticates once, opens the server's event stream, and sends
//! `tools/list` and `tools/call` requests. Two server dialects are supported:
//! one announces a submission endpoint on the stream and answers there, the
//! other answers each POST inline.
//!
//! # Quick Start
//!
//! ```no_run
//! use celonis_mcp::prelude::*;
//!
//! # async fn example() -> celonis_mcp::error::Result<()> {
//! let config = McpClientConfig::new(
//!     EndpointSource::Url("https://acme.celonis.cloud/mcp/sse".into()),
//!     Credentials::StaticToken("app-key".into()),
//! );
//! let session = McpSession::new(config)?;
//! println!("{}", session.list_tools().await?);
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod sse;
pub mod transport;

#[cfg(feature = "cli")]
pub mod cli;
