//! Convenience re-exports for common use.

pub use crate::auth::{Credentials, Token};
pub use crate::client::{ConnectionState, McpSession};
pub use crate::config::{HttpSettings, McpClientConfig, ProxySettings, Timeouts, TlsVerification};
pub use crate::endpoint::{EndpointSource, ProtocolVariant};
pub use crate::error::{McpError, Result};
