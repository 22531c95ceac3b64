//! Subprocess transport for the agent CLI.
//!
//! Owns the child process end-to-end: spawns it with the assembled
//! argument vector, pipes stdin/stdout/stderr, frames stdout into JSON
//! records through [`RecordCodec`], serializes stdin writes under a
//! single-holder lock, fans stderr lines out to an optional callback,
//! and tears everything down on close.
//!
//! A terminal write or decode error poisons the transport: the error is
//! recorded and every subsequent write fails with it. Closing is
//! irreversible.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{AgentError, Result};
use crate::options::{AgentOptions, StderrCallback};
use crate::transport::codec::{RecordCodec, DEFAULT_MAX_BUFFER_BYTES};
use crate::transport::{args, discovery, LaunchMode, Transport, TransportFuture};

/// Number of trailing stderr lines retained for `ProcessFailed` errors.
const STDERR_TAIL_LINES: usize = 100;

/// Bounded wait for the stderr task to finish during close.
const STDERR_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Framed stdout plus the one-time exit check performed at EOF.
struct StdoutState {
    framed: FramedRead<ChildStdout, RecordCodec>,
    exit_checked: bool,
}

/// Transport over a spawned agent CLI process.
pub struct SubprocessTransport {
    child: Mutex<Child>,
    /// Single-holder write lock; `None` once stdin has been closed.
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<StdoutState>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    stderr_tail: Arc<std::sync::Mutex<VecDeque<String>>>,
    /// Terminal error recorded by a failed write or read.
    fault: std::sync::Mutex<Option<AgentError>>,
    temp_files: Vec<PathBuf>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl SubprocessTransport {
    /// Resolve the CLI, assemble arguments, and spawn the process.
    ///
    /// `entrypoint` names the SDK surface for observability
    /// (`sdk-rust` or `sdk-rust-client`).
    ///
    /// # Errors
    ///
    /// - [`AgentError::CliNotFound`] when no executable can be resolved.
    /// - [`AgentError::WorkingDirectoryNotFound`] for a missing cwd.
    /// - [`AgentError::Connection`] when the spawn itself fails.
    pub async fn connect(
        options: &AgentOptions,
        mode: LaunchMode,
        entrypoint: &str,
    ) -> Result<Self> {
        let cli = discovery::find_cli(options.cli_path.as_deref())?;
        discovery::check_working_dir(options.cwd.as_deref())?;
        discovery::probe_version(&cli).await;

        let assembled = args::assemble(options, &mode)?;
        debug!(cli = %cli.display(), args = ?assembled.tokens, "transport: spawning agent CLI");

        let mut cmd = Command::new(&cli);
        cmd.args(&assembled.tokens)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        cmd.env("CLAUDE_CODE_ENTRYPOINT", entrypoint);
        cmd.env("CLAUDE_AGENT_SDK_VERSION", env!("CARGO_PKG_VERSION"));
        if options.enable_file_checkpointing {
            cmd.env("CLAUDE_CODE_ENABLE_SDK_FILE_CHECKPOINTING", "1");
        }
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
            cmd.env("PWD", cwd);
        }
        ensure_process_env(entrypoint);

        let mut child = cmd.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AgentError::CliNotFound {
                    attempted: cli.display().to_string(),
                }
            } else {
                AgentError::Connection(format!("failed to spawn agent CLI: {err}"))
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Connection("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Connection("failed to capture agent stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Connection("failed to capture agent stderr".into()))?;

        let max_buffer = options.max_buffer_size.unwrap_or(DEFAULT_MAX_BUFFER_BYTES);
        let cancel = CancellationToken::new();
        let stderr_tail = Arc::new(std::sync::Mutex::new(VecDeque::new()));
        let stderr_task = spawn_stderr_reader(
            stderr,
            Arc::clone(&stderr_tail),
            options.stderr.clone(),
            cancel.clone(),
        );

        // One-shot sessions never write to stdin; close it right away so
        // the tool does not wait for input.
        let stdin = match mode {
            LaunchMode::OneShot { .. } => None,
            LaunchMode::Streaming => Some(stdin),
        };

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(StdoutState {
                framed: FramedRead::new(stdout, RecordCodec::with_max_buffer(max_buffer)),
                exit_checked: false,
            }),
            stderr_task: Mutex::new(Some(stderr_task)),
            stderr_tail,
            fault: std::sync::Mutex::new(None),
            temp_files: assembled.temp_files,
            closed: AtomicBool::new(false),
            cancel,
        })
    }

    /// Serialize and write one record, holding the write lock across the
    /// whole serialize-write-flush sequence.
    async fn write_record_inner(&self, record: Value) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::NotConnected);
        }

        let mut stdin = self.stdin.lock().await;

        if let Some(fault) = self.current_fault() {
            // Once a terminal error is recorded the duplex channel is
            // gone; writes surface that as a lost connection.
            return Err(match fault {
                err @ (AgentError::ConnectionLost(_) | AgentError::ProcessFailed { .. }) => err,
                other => AgentError::ConnectionLost(format!("transport errored: {other}")),
            });
        }
        if let Some(status) = self.child.lock().await.try_wait().ok().flatten() {
            let err = AgentError::ConnectionLost(format!(
                "agent process already exited with {status}"
            ));
            self.record_fault(&err);
            return Err(err);
        }

        let Some(writer) = stdin.as_mut() else {
            return Err(AgentError::ConnectionLost("stdin already closed".into()));
        };

        let mut bytes = serde_json::to_vec(&record)
            .map_err(|e| AgentError::Sdk(format!("failed to serialize outbound record: {e}")))?;
        bytes.push(b'\n');

        let write = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        if let Err(err) = write.await {
            let err = AgentError::ConnectionLost(format!("write to agent stdin failed: {err}"));
            self.record_fault(&err);
            warn!(error = %err, "transport: stdin write failed");
            return Err(err);
        }
        Ok(())
    }

    async fn read_record_inner(&self) -> Option<Result<Value>> {
        let mut stdout = self.stdout.lock().await;

        match stdout.framed.next().await {
            Some(Ok(value)) => Some(Ok(value)),
            Some(Err(err)) => {
                self.record_fault(&err);
                Some(Err(err))
            }
            None => {
                if stdout.exit_checked {
                    return None;
                }
                stdout.exit_checked = true;

                // Stdout closed; reap the process and surface a nonzero
                // exit as the final stream item.
                let status = self.child.lock().await.wait().await;
                match status {
                    Ok(status) if status.success() => None,
                    Ok(status) => {
                        let err = AgentError::ProcessFailed {
                            exit_code: status.code(),
                            stderr: self.stderr_snapshot(),
                        };
                        self.record_fault(&err);
                        Some(Err(err))
                    }
                    Err(wait_err) => {
                        let err = AgentError::Connection(format!(
                            "failed to reap agent process: {wait_err}"
                        ));
                        self.record_fault(&err);
                        Some(Err(err))
                    }
                }
            }
        }
    }

    async fn end_input_inner(&self) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        if stdin.take().is_some() {
            debug!("transport: stdin closed");
        }
        Ok(())
    }

    async fn close_inner(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();

        for path in &self.temp_files {
            if let Err(err) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %err, "transport: temp file cleanup failed");
            }
        }

        if let Some(task) = self.stderr_task.lock().await.take() {
            if tokio::time::timeout(STDERR_JOIN_TIMEOUT, task).await.is_err() {
                debug!("transport: stderr task did not finish in time");
            }
        }

        self.end_input_inner().await.ok();

        let mut child = self.child.lock().await;
        if child.try_wait().ok().flatten().is_none() {
            child.start_kill().ok();
        }
        if let Err(err) = child.wait().await {
            warn!(error = %err, "transport: wait after kill failed");
        }

        debug!("transport: closed");
        Ok(())
    }

    fn current_fault(&self) -> Option<AgentError> {
        self.fault
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().cloned())
    }

    fn record_fault(&self, err: &AgentError) {
        if let Ok(mut guard) = self.fault.lock() {
            guard.get_or_insert_with(|| err.clone());
        }
    }

    fn stderr_snapshot(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

impl Transport for SubprocessTransport {
    fn write_record(&self, record: Value) -> TransportFuture<'_, Result<()>> {
        Box::pin(self.write_record_inner(record))
    }

    fn read_record(&self) -> TransportFuture<'_, Option<Result<Value>>> {
        Box::pin(self.read_record_inner())
    }

    fn end_input(&self) -> TransportFuture<'_, Result<()>> {
        Box::pin(self.end_input_inner())
    }

    fn close(&self) -> TransportFuture<'_, Result<()>> {
        Box::pin(self.close_inner())
    }

    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.current_fault().is_none()
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        for path in &self.temp_files {
            std::fs::remove_file(path).ok();
        }
    }
}

impl std::fmt::Debug for SubprocessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessTransport")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("temp_files", &self.temp_files)
            .finish_non_exhaustive()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Set observability variables in the process environment, once.
fn ensure_process_env(entrypoint: &str) {
    use std::sync::Once;
    static INIT: Once = Once::new();
    let entrypoint = entrypoint.to_owned();
    INIT.call_once(move || {
        if std::env::var_os("CLAUDE_CODE_ENTRYPOINT").is_none() {
            std::env::set_var("CLAUDE_CODE_ENTRYPOINT", entrypoint);
        }
        std::env::set_var("CLAUDE_AGENT_SDK_VERSION", env!("CARGO_PKG_VERSION"));
    });
}

/// Read stderr line-by-line, retaining a bounded tail and invoking the
/// optional consumer. Consumer panics are swallowed.
fn spawn_stderr_reader(
    stderr: tokio::process::ChildStderr,
    tail: Arc<std::sync::Mutex<VecDeque<String>>>,
    callback: Option<StderrCallback>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Ok(mut tail) = tail.lock() {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line.clone());
                        }
                        if let Some(callback) = &callback {
                            let result = catch_unwind(AssertUnwindSafe(|| callback(&line)));
                            if result.is_err() {
                                warn!("transport: stderr callback panicked; line dropped");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!(error = %err, "transport: stderr read error");
                        break;
                    }
                },
            }
        }
    })
}
