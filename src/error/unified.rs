//! Error classification and recovery hints.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Configuration,
    Network,
    Timeout,
    Server,
    Transport,
    Rpc,
    Protocol,
    Session,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryLater,
    Reconnect,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    CheckRequest,
    ContactSupport,
}
