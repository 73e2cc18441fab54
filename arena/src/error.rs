//! Error types for arena operations.
//!
//! Only caller invariant violations surface as errors. Adapter failures and
//! transient loop errors are recovered locally by the scheduler and never
//! reach the caller.

/// Error type for arena operations.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("agent `{0}` is already registered")]
    DuplicateAgent(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("channel `{0}` already exists")]
    DuplicateChannel(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("agent `{agent}` failed to connect")]
    Connect {
        agent: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;
