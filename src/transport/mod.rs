//! Transport layer: subprocess ownership and NDJSON framing.
//!
//! The [`Transport`] trait is the seam between the control-protocol
//! handler and the wire. Production sessions use
//! [`SubprocessTransport`]; tests drive the handler through an
//! in-memory implementation.

pub mod args;
pub mod codec;
pub mod discovery;
pub mod subprocess;

pub use codec::{RecordCodec, DEFAULT_MAX_BUFFER_BYTES};
pub use subprocess::SubprocessTransport;

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;
use serde_json::Value;

use crate::Result;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How the tool process is launched.
#[derive(Debug, Clone)]
pub enum LaunchMode {
    /// `--print -- <prompt>`; stdin is closed immediately after spawn.
    OneShot {
        /// The prompt passed on the command line.
        prompt: String,
    },
    /// `--input-format stream-json`; prompts arrive over stdin.
    Streaming,
}

/// What the caller feeds the session at connect time.
pub enum PromptInput {
    /// A single prompt string (one-shot launch).
    Text(String),
    /// An asynchronous stream of user records written to stdin.
    Stream(Pin<Box<dyn Stream<Item = Value> + Send>>),
    /// Nothing up front; prompts are sent interactively later.
    Interactive,
}

impl std::fmt::Debug for PromptInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Interactive => f.write_str("Interactive"),
        }
    }
}

/// Duplex record channel to the agent process.
///
/// Implementations own the byte streams end-to-end. Writes are
/// serialized: at most one bytes-on-wire operation is in flight per
/// transport. Reads are pull-based and single-consumer — the
/// control-protocol handler's record loop.
pub trait Transport: Send + Sync {
    /// Serialize `record` as one NDJSON line and write it to the tool.
    ///
    /// # Errors
    ///
    /// - [`crate::AgentError::ConnectionLost`] when the process has
    ///   exited or the pipe is broken; the transport is poisoned and
    ///   subsequent writes fail with the same error.
    /// - [`crate::AgentError::NotConnected`] after [`Transport::close`].
    fn write_record(&self, record: Value) -> TransportFuture<'_, Result<()>>;

    /// Pull the next framed record. `None` means EOF; a nonzero exit is
    /// surfaced as the final `Some(Err(ProcessFailed))` before `None`.
    fn read_record(&self) -> TransportFuture<'_, Option<Result<Value>>>;

    /// Close stdin. Irreversible; subsequent writes fail.
    fn end_input(&self) -> TransportFuture<'_, Result<()>>;

    /// Tear the transport down: temp files, stderr task, stdin, process.
    /// Irreversible.
    fn close(&self) -> TransportFuture<'_, Result<()>>;

    /// Whether the transport can still accept work.
    fn is_ready(&self) -> bool;
}
