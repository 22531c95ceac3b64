//! Error types shared across the crate.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Maximum number of bytes of an offending NDJSON line retained for display.
const DISPLAY_LINE_LIMIT: usize = 200;

/// Flat error enumeration covering every failure mode exposed at the
/// crate boundary.
///
/// Errors from user-supplied callbacks (permission, hook, MCP handlers)
/// never appear here — they are serialized into the control response and
/// the session continues.
#[derive(Debug)]
pub enum AgentError {
    /// General SDK failure with a human-readable message.
    Sdk(String),
    /// Unable to reach or communicate with the agent CLI.
    Connection(String),
    /// The duplex channel to the agent process was lost mid-session.
    ConnectionLost(String),
    /// The agent CLI executable could not be located.
    CliNotFound {
        /// The path (or search description) that was attempted.
        attempted: String,
    },
    /// The configured working directory does not exist.
    WorkingDirectoryNotFound(PathBuf),
    /// The agent process exited with a nonzero status.
    ProcessFailed {
        /// Exit code, when the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Captured trailing stderr output.
        stderr: String,
    },
    /// Malformed or oversized NDJSON on the record stream.
    Decode {
        /// The offending line, truncated for display.
        line: String,
        /// The underlying decoder failure.
        reason: String,
    },
    /// Well-formed JSON whose shape is not a recognized message.
    MessageParse {
        /// What was wrong with the record.
        reason: String,
        /// The raw record, preserved for the caller.
        record: serde_json::Value,
    },
    /// A control request received no response within its deadline.
    ControlTimeout {
        /// The request subtype that timed out.
        subtype: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },
    /// The session is closed; no further operations are accepted.
    NotConnected,
    /// The operation was cancelled before completion.
    Cancelled(String),
}

impl AgentError {
    /// Build an [`AgentError::Decode`] error, truncating `line` for display.
    #[must_use]
    pub fn decode(line: &str, reason: impl Into<String>) -> Self {
        let truncated = if line.len() > DISPLAY_LINE_LIMIT {
            let mut end = DISPLAY_LINE_LIMIT;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &line[..end])
        } else {
            line.to_owned()
        };
        Self::Decode {
            line: truncated,
            reason: reason.into(),
        }
    }
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sdk(msg) => write!(f, "sdk: {msg}"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {msg}"),
            Self::CliNotFound { attempted } => {
                write!(f, "agent CLI not found (attempted: {attempted})")
            }
            Self::WorkingDirectoryNotFound(path) => {
                write!(f, "working directory does not exist: {}", path.display())
            }
            Self::ProcessFailed { exit_code, stderr } => match exit_code {
                Some(code) => write!(f, "agent process exited with code {code}: {stderr}"),
                None => write!(f, "agent process terminated by signal: {stderr}"),
            },
            Self::Decode { line, reason } => {
                write!(f, "decode failure: {reason} (line: {line})")
            }
            Self::MessageParse { reason, .. } => write!(f, "message parse failure: {reason}"),
            Self::ControlTimeout { subtype, timeout } => {
                write!(f, "control request '{subtype}' timed out after {timeout:?}")
            }
            Self::NotConnected => write!(f, "not connected"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

impl Clone for AgentError {
    fn clone(&self) -> Self {
        match self {
            Self::Sdk(m) => Self::Sdk(m.clone()),
            Self::Connection(m) => Self::Connection(m.clone()),
            Self::ConnectionLost(m) => Self::ConnectionLost(m.clone()),
            Self::CliNotFound { attempted } => Self::CliNotFound {
                attempted: attempted.clone(),
            },
            Self::WorkingDirectoryNotFound(p) => Self::WorkingDirectoryNotFound(p.clone()),
            Self::ProcessFailed { exit_code, stderr } => Self::ProcessFailed {
                exit_code: *exit_code,
                stderr: stderr.clone(),
            },
            Self::Decode { line, reason } => Self::Decode {
                line: line.clone(),
                reason: reason.clone(),
            },
            Self::MessageParse { reason, record } => Self::MessageParse {
                reason: reason.clone(),
                record: record.clone(),
            },
            Self::ControlTimeout { subtype, timeout } => Self::ControlTimeout {
                subtype: subtype.clone(),
                timeout: *timeout,
            },
            Self::NotConnected => Self::NotConnected,
            Self::Cancelled(m) => Self::Cancelled(m.clone()),
        }
    }
}
