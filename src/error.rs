//! # Error Module
//!
//! Error types for the logging core, modeled as a chain: a new error may
//! carry a boxed cause, and the chain depth is bounded so a misbehaving
//! sink or channel can never wedge the Internal Handler in an infinite
//! retry loop (see `MAX_DEPTH_ERR` in `handler`).

use std::fmt;

/// Error kinds produced by the logging core.
///
/// Each variant carries a human-readable detail string and, optionally,
/// the error that caused it. Chains are walked by `depth` and rendered
/// by `Display`.
#[derive(Debug)]
pub enum LogCoreError {
    /// Attempted lifecycle transition is not legal from the current state.
    IllegalState(String),
    /// Invalid configuration (unknown level name, malformed rule, ...).
    Config(String),
    /// Producer exhausted `RETRIES_MAX` attempts to enqueue onto the data channel.
    RetriesExhausted(String),
    /// A control-channel reply did not match the expected tag.
    ProtocolMismatch(String),
    /// An underlying OS call failed (open, write, poll, sigaction, fork, ...).
    PlatformCallFailed(String, Option<Box<LogCoreError>>),
    /// An internal invariant was violated.
    AssertionFailed(String),
    /// The handler's error chain depth exceeded `MAX_DEPTH_ERR`; the loop aborted.
    TooManyErrors(String, Option<Box<LogCoreError>>),
}

impl LogCoreError {
    /// Wraps `self` as the cause of a new `PlatformCallFailed` error.
    pub fn chain(self, detail: impl Into<String>) -> LogCoreError {
        LogCoreError::PlatformCallFailed(detail.into(), Some(Box::new(self)))
    }

    /// Returns the immediate cause of this error, if any.
    pub fn cause(&self) -> Option<&LogCoreError> {
        match self {
            LogCoreError::PlatformCallFailed(_, c) | LogCoreError::TooManyErrors(_, c) => {
                c.as_deref()
            }
            _ => None,
        }
    }

    /// Number of links in the error chain, counting `self`.
    pub fn depth(&self) -> usize {
        match self.cause() {
            Some(c) => 1 + c.depth(),
            None => 1,
        }
    }
}

impl fmt::Display for LogCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogCoreError::IllegalState(s) => write!(f, "illegal state transition: {s}"),
            LogCoreError::Config(s) => write!(f, "configuration error: {s}"),
            LogCoreError::RetriesExhausted(s) => write!(f, "retries exhausted: {s}"),
            LogCoreError::ProtocolMismatch(s) => write!(f, "protocol mismatch: {s}"),
            LogCoreError::AssertionFailed(s) => write!(f, "assertion failed: {s}"),
            LogCoreError::PlatformCallFailed(s, cause) => {
                write!(f, "platform call failed: {s}")?;
                if let Some(c) = cause {
                    write!(f, "\ncaused by: {c}")?;
                }
                Ok(())
            }
            LogCoreError::TooManyErrors(s, cause) => {
                write!(f, "too many errors: {s}")?;
                if let Some(c) = cause {
                    write!(f, "\ncaused by: {c}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for LogCoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for LogCoreError {
    fn from(err: std::io::Error) -> Self {
        LogCoreError::PlatformCallFailed(err.to_string(), None)
    }
}

/// Convenient Result type alias for logging-core operations.
pub type Result<T> = std::result::Result<T, LogCoreError>;
