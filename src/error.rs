//! Typed failures for the transport and audit layers.

use crate::mcp::errors;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by a [`ProcessSession`](crate::session::ProcessSession).
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to spawn `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write request: {0}")]
    WriteError(#[source] io::Error),

    #[error("response is not valid JSON ({message}): {line}")]
    ParseError { message: String, line: String },

    #[error("server closed its output before a full response line arrived")]
    EmptyResponse,

    /// No complete line arrived in time. Callers may treat this as non-fatal.
    #[error("no response within {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("expected response id {expected}, got {actual}")]
    UnexpectedId { expected: u64, actual: String },

    #[error("request {id} rejected: {reason}")]
    OutOfSequence { id: u64, reason: String },
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::SpawnFailed { .. } => errors::SPAWN_FAILED,
            SessionError::WriteError(_) => errors::WRITE_ERROR,
            SessionError::ParseError { .. } => errors::PARSE_ERROR,
            SessionError::EmptyResponse => errors::EMPTY_RESPONSE,
            SessionError::TimedOut(_) => errors::TIMED_OUT,
            SessionError::UnexpectedId { .. } => errors::UNEXPECTED_ID,
            SessionError::OutOfSequence { .. } => errors::OUT_OF_SEQUENCE,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::TimedOut(_))
    }
}

/// Failures raised while auditing the deployment descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("configuration file not found at {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("invalid configuration in {}: {message}", .path.display())]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("configuration incomplete: {0}")]
    ConfigIncomplete(String),

    #[error("server executable not found at {}", .0.display())]
    ExecutableMissing(PathBuf),

    #[error("server executable is not runnable: {}", .0.display())]
    ExecutableNotRunnable(PathBuf),

    #[error("server did not respond to initialize: {0}")]
    ServerUnresponsive(String),
}

impl AuditError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::ConfigMissing(_) => errors::CONFIG_MISSING,
            AuditError::ConfigInvalid { .. } => errors::CONFIG_INVALID,
            AuditError::ConfigIncomplete(_) => errors::CONFIG_INCOMPLETE,
            AuditError::ExecutableMissing(_) => errors::EXECUTABLE_MISSING,
            AuditError::ExecutableNotRunnable(_) => errors::EXECUTABLE_NOT_RUNNABLE,
            AuditError::ServerUnresponsive(_) => errors::SERVER_UNRESPONSIVE,
        }
    }
}
