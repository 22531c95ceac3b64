//! Bidirectional control-protocol handler.
//!
//! Owns the transport's record stream and routes every record:
//!
//! - `control_response` → completes the matching pending request.
//! - `control_request` → dispatched concurrently to the registered
//!   callback (permission, hook, or MCP bridge), then answered with a
//!   correlated `control_response`.
//! - `control_cancel_request` → accepted and discarded.
//! - `result` records → raise the single-shot first-result latch, then
//!   flow to the data channel.
//! - everything else → flows to the data channel in arrival order.
//!
//! The data channel is a bounded FIFO; when the consumer falls behind,
//! the record loop waits, back-pressuring the tool.
//!
//! # Lifecycle
//!
//! `Created ──start()──► Reading ──initialize()──► Initialized ──close()──► Closed`
//!
//! `Reading` and `Initialized` both accept outbound requests; only
//! `Initialized` guarantees a cached initialize payload. `Closed` is
//! terminal: every subsequent operation fails with `NotConnected`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::control::{
    build_hook_config, error_response, parse_response, request_envelope, success_response,
    InboundRequest, OutboundRequest, CONTROL_CANCEL_REQUEST, CONTROL_REQUEST, CONTROL_RESPONSE,
};
use crate::errors::{AgentError, Result};
use crate::hooks::{HookCallback, HookContext, HookEvent, HookMatcher};
use crate::mcp::McpBridge;
use crate::permissions::{CanUseToolCallback, ToolPermissionContext};
use crate::transport::Transport;

/// Deadline for ordinary outbound control requests.
pub const CONTROL_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the bounded data channel feeding downstream consumers.
const DATA_CHANNEL_CAPACITY: usize = 100;

/// Environment override for the initialize/close timeout, in milliseconds.
const STREAM_CLOSE_TIMEOUT_ENV: &str = "CLAUDE_CODE_STREAM_CLOSE_TIMEOUT";

/// Floor for the initialize/close timeout.
const MIN_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Handler lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Reading,
    Initialized,
    Closed,
}

type PendingSender = oneshot::Sender<Result<Option<Value>>>;

struct Shared {
    transport: Arc<dyn Transport>,
    /// Outbound requests awaiting their correlated response.
    pending: Mutex<HashMap<String, PendingSender>>,
    /// Callback-id → hook; immutable once the handshake completes.
    hook_registry: std::sync::Mutex<HashMap<String, HookCallback>>,
    /// Server-name → bridge; populated before the record loop starts so
    /// inbound `mcp_message` requests are answerable immediately.
    bridges: HashMap<String, Arc<McpBridge>>,
    can_use_tool: Option<CanUseToolCallback>,
    /// Sender side of the data channel; dropped when the loop ends so
    /// consumers observe channel closure.
    data_tx: std::sync::Mutex<Option<mpsc::Sender<Result<Value>>>>,
    /// Single-shot latch: raised when the first `result` record is seen.
    first_result: watch::Sender<bool>,
    request_counter: AtomicU64,
    state: std::sync::Mutex<State>,
    server_info: std::sync::Mutex<Option<Value>>,
    cancel: CancellationToken,
}

/// The control-protocol handler for one session.
pub struct ControlHandler {
    shared: Arc<Shared>,
    data_rx: Mutex<mpsc::Receiver<Result<Value>>>,
    record_loop: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ControlHandler {
    /// Build a handler over `transport`.
    ///
    /// Bridges must be supplied up front — the registry is immutable so
    /// that inbound routing needs no locking against mutation.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        bridges: HashMap<String, Arc<McpBridge>>,
        can_use_tool: Option<CanUseToolCallback>,
    ) -> Self {
        let (data_tx, data_rx) = mpsc::channel(DATA_CHANNEL_CAPACITY);
        let (first_result, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                transport,
                pending: Mutex::new(HashMap::new()),
                hook_registry: std::sync::Mutex::new(HashMap::new()),
                bridges,
                can_use_tool,
                data_tx: std::sync::Mutex::new(Some(data_tx)),
                first_result,
                request_counter: AtomicU64::new(0),
                state: std::sync::Mutex::new(State::Created),
                server_info: std::sync::Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
            data_rx: Mutex::new(data_rx),
            record_loop: std::sync::Mutex::new(None),
        }
    }

    /// Start the record loop. Must be called exactly once.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Sdk`] when the handler was already started.
    /// - [`AgentError::NotConnected`] when it was already closed.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = lock_state(&self.shared);
            match *state {
                State::Created => *state = State::Reading,
                State::Closed => return Err(AgentError::NotConnected),
                _ => return Err(AgentError::Sdk("record loop already started".into())),
            }
        }

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_record_loop(shared));
        *self
            .record_loop
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Perform the initialize handshake: register hook callbacks, send
    /// the `initialize` control request, and cache the returned payload
    /// as server info.
    ///
    /// Happens exactly once per session, before any caller-initiated
    /// work. The response deadline is [`close_timeout`] (≥ 60 s).
    ///
    /// # Errors
    ///
    /// - [`AgentError::ControlTimeout`] when no response arrives in time.
    /// - Any transport write failure, which also poisons the handler.
    pub async fn initialize(
        &self,
        hooks: &HashMap<HookEvent, Vec<HookMatcher>>,
    ) -> Result<Option<Value>> {
        let hook_config = build_hook_config(hooks).map(|(config, allocations)| {
            let mut registry = self
                .shared
                .hook_registry
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for (id, callback) in allocations {
                registry.insert(id, callback);
            }
            config
        });

        let response = self
            .send_request_with_timeout(
                OutboundRequest::Initialize { hooks: hook_config },
                close_timeout(),
            )
            .await?;

        *self
            .shared
            .server_info
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = response.clone();
        {
            let mut state = lock_state(&self.shared);
            if *state == State::Reading {
                *state = State::Initialized;
            }
        }
        debug!("control: initialize handshake complete");
        Ok(response)
    }

    /// Send an outbound control request and await its correlated
    /// response, with the standard 60 s deadline.
    pub async fn send_request(&self, request: OutboundRequest) -> Result<Option<Value>> {
        self.send_request_with_timeout(request, CONTROL_REQUEST_TIMEOUT)
            .await
    }

    /// [`Self::send_request`] with an explicit deadline. Expiry evicts
    /// the pending entry and surfaces [`AgentError::ControlTimeout`].
    pub async fn send_request_with_timeout(
        &self,
        request: OutboundRequest,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        match *lock_state(&self.shared) {
            State::Reading | State::Initialized => {}
            State::Closed => return Err(AgentError::NotConnected),
            State::Created => {
                return Err(AgentError::Sdk(
                    "record loop not started; call start() first".into(),
                ))
            }
        }

        let subtype = request.subtype();
        let request_id = self.shared.next_request_id();
        let payload = serde_json::to_value(&request)
            .map_err(|e| AgentError::Sdk(format!("failed to serialize control request: {e}")))?;

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .await
            .insert(request_id.clone(), tx);

        let envelope = request_envelope(&request_id, &payload);
        if let Err(err) = self.shared.transport.write_record(envelope).await {
            // A failed write poisons the handler: evict our own entry and
            // fail every other pending request with the same error.
            self.shared.pending.lock().await.remove(&request_id);
            self.shared.fail_all_pending(&err).await;
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_dropped)) => Err(AgentError::Cancelled(format!(
                "handler closed while '{subtype}' was pending"
            ))),
            Err(_elapsed) => {
                self.shared.pending.lock().await.remove(&request_id);
                Err(AgentError::ControlTimeout {
                    subtype: subtype.to_owned(),
                    timeout,
                })
            }
        }
    }

    /// The cached initialize payload, once the handshake has completed.
    #[must_use]
    pub fn server_info(&self) -> Option<Value> {
        self.shared
            .server_info
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Pull the next data-plane record. `None` once the channel closes
    /// (record-stream EOF, terminal error, or handler close).
    pub async fn next_record(&self) -> Option<Result<Value>> {
        self.data_rx.lock().await.recv().await
    }

    /// Whether the first `result` record has been observed.
    #[must_use]
    pub fn first_result_seen(&self) -> bool {
        *self.shared.first_result.borrow()
    }

    /// Whether any bidirectional callback (hook, bridge, permission) is
    /// registered — the condition that keeps stdin open during
    /// generation.
    #[must_use]
    pub fn has_callbacks(&self) -> bool {
        self.shared.can_use_tool.is_some()
            || !self.shared.bridges.is_empty()
            || !self
                .shared
                .hook_registry
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .is_empty()
    }

    /// Close stdin once it is safe to do so.
    ///
    /// With callbacks registered, stdin stays open until the first
    /// `result` record arrives (bounded by [`close_timeout`]) so the
    /// duplex channel survives control traffic during generation.
    /// Without callbacks, stdin closes immediately.
    pub async fn finish_input(&self) -> Result<()> {
        if self.has_callbacks() && !self.first_result_seen() {
            let mut latch = self.shared.first_result.subscribe();
            let waited =
                tokio::time::timeout(close_timeout(), latch.wait_for(|seen| *seen)).await;
            if waited.is_err() {
                warn!("control: first-result gate expired; closing stdin anyway");
            }
        }
        self.shared.transport.end_input().await
    }

    /// Tear the handler down: cancel the record loop, fail every pending
    /// request, and close the transport. Idempotent; the handler is
    /// unusable afterwards.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = lock_state(&self.shared);
            if *state == State::Closed {
                return Ok(());
            }
            *state = State::Closed;
        }

        self.shared.cancel.cancel();
        self.shared
            .fail_all_pending(&AgentError::Cancelled("session closed".into()))
            .await;

        let handle = self
            .record_loop
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(2), handle).await.is_err() {
                warn!("control: record loop did not stop in time");
            }
        }
        self.shared.drop_data_sender();

        self.shared.transport.close().await
    }
}

impl std::fmt::Debug for ControlHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandler")
            .field("state", &*lock_state(&self.shared))
            .field("bridges", &self.shared.bridges.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Globally unique request identifier.
    fn next_request_id(&self) -> String {
        let n = self.request_counter.fetch_add(1, Ordering::SeqCst);
        format!("req_{n}_{}", Uuid::new_v4().simple())
    }

    /// Fail every pending request with `err` and empty the table.
    async fn fail_all_pending(&self, err: &AgentError) {
        let drained: Vec<(String, PendingSender)> =
            self.pending.lock().await.drain().collect();
        for (request_id, sender) in drained {
            debug!(request_id, "control: failing pending request");
            let _ = sender.send(Err(err.clone()));
        }
    }

    fn data_sender(&self) -> Option<mpsc::Sender<Result<Value>>> {
        self.data_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn drop_data_sender(&self) {
        self.data_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

/// Lock the state mutex, recovering from poisoning — the state enum
/// stays coherent even if a holder panicked mid-transition.
fn lock_state(shared: &Shared) -> std::sync::MutexGuard<'_, State> {
    shared
        .state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Initialize/close timeout: `CLAUDE_CODE_STREAM_CLOSE_TIMEOUT` in
/// milliseconds, floored at 60 s.
fn close_timeout() -> Duration {
    std::env::var(STREAM_CLOSE_TIMEOUT_ENV)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map_or(MIN_CLOSE_TIMEOUT, |ms| {
            MIN_CLOSE_TIMEOUT.max(Duration::from_millis(ms))
        })
}

// ── Record loop ───────────────────────────────────────────────────────────────

async fn run_record_loop(shared: Arc<Shared>) {
    loop {
        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => {
                debug!("control: record loop cancelled");
                break;
            }

            item = shared.transport.read_record() => match item {
                None => {
                    debug!("control: record stream EOF");
                    shared
                        .fail_all_pending(&AgentError::ConnectionLost(
                            "record stream ended".into(),
                        ))
                        .await;
                    break;
                }
                Some(Err(err)) => {
                    warn!(error = %err, "control: record stream error");
                    if let Some(tx) = shared.data_sender() {
                        let _ = tx.send(Err(err.clone())).await;
                    }
                    shared.fail_all_pending(&err).await;
                    break;
                }
                Some(Ok(record)) => route_record(&shared, record).await,
            },
        }
    }

    // Dropping the sender closes the data channel for consumers.
    shared.drop_data_sender();
}

async fn route_record(shared: &Arc<Shared>, record: Value) {
    let record_type = record.get("type").and_then(Value::as_str).unwrap_or("");

    match record_type {
        CONTROL_RESPONSE => {
            let Some(parsed) = parse_response(&record) else {
                warn!("control: malformed control_response dropped");
                return;
            };
            let sender = shared.pending.lock().await.remove(&parsed.request_id);
            match sender {
                Some(sender) => {
                    let outcome = parsed.outcome.map_err(|msg| {
                        AgentError::Sdk(format!("control request failed: {msg}"))
                    });
                    let _ = sender.send(outcome);
                }
                None => {
                    // Response for an evicted (timed out / cancelled)
                    // request; invariant says drop it.
                    debug!(
                        request_id = %parsed.request_id,
                        "control: response without pending entry dropped"
                    );
                }
            }
        }

        CONTROL_REQUEST => {
            let request_id = record
                .get("request_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let request = record.get("request").cloned().unwrap_or(Value::Null);
            // Dispatch concurrently so a slow callback cannot stall the
            // record loop; the response write is still serialized by the
            // transport's write lock.
            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                let response = dispatch_inbound(&shared, &request).await;
                let record = match response {
                    Ok(payload) => success_response(&request_id, Some(payload)),
                    Err(message) => error_response(&request_id, &message),
                };
                if let Err(err) = shared.transport.write_record(record).await {
                    warn!(error = %err, request_id, "control: response write failed");
                }
            });
        }

        CONTROL_CANCEL_REQUEST => {
            // TODO: plumb a CancellationToken into in-flight dispatch
            // tasks once the tool defines cancellation semantics.
            debug!("control: control_cancel_request accepted and discarded");
        }

        _ => {
            if record_type == "result" {
                shared.first_result.send_replace(true);
            }
            if let Some(tx) = shared.data_sender() {
                if tx.send(Ok(record)).await.is_err() {
                    debug!("control: data channel consumer gone");
                }
            }
        }
    }
}

/// Answer one inbound control request. `Err` carries the message for an
/// error response; callback failures never poison the session.
async fn dispatch_inbound(
    shared: &Arc<Shared>,
    request: &Value,
) -> std::result::Result<Value, String> {
    let inbound: InboundRequest = serde_json::from_value(request.clone()).map_err(|e| {
        let subtype = request
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or("<missing>");
        format!("unsupported control request '{subtype}': {e}")
    })?;

    match inbound {
        InboundRequest::CanUseTool {
            tool_name,
            input,
            permission_suggestions,
        } => {
            let Some(callback) = &shared.can_use_tool else {
                return Err("can_use_tool callback is not registered".into());
            };
            let context = ToolPermissionContext {
                suggestions: permission_suggestions.unwrap_or_default(),
            };
            let result = callback(tool_name, input, context)
                .await
                .map_err(|e| e.to_string())?;
            result.to_wire().map_err(|e| e.to_string())
        }

        InboundRequest::HookCallback {
            callback_id,
            input,
            tool_use_id,
        } => {
            let callback = shared
                .hook_registry
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&callback_id)
                .cloned();
            let Some(callback) = callback else {
                return Err(format!("no hook callback registered for id '{callback_id}'"));
            };
            let context = HookContext {
                signal: Some(shared.cancel.child_token()),
            };
            let output = callback(input, tool_use_id, context)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(output)
                .map_err(|e| format!("failed to serialize hook output: {e}"))
        }

        InboundRequest::McpMessage {
            server_name,
            message,
        } => match shared.bridges.get(&server_name) {
            Some(bridge) => {
                let response = bridge.handle(&message).await;
                Ok(json!({ "mcp_response": response }))
            }
            None => {
                let id = message.get("id").cloned().unwrap_or(Value::Null);
                Ok(json!({
                    "mcp_response": {
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {
                            "code": -32601,
                            "message": format!("SDK MCP server '{server_name}' not found"),
                        },
                    },
                }))
            }
        },
    }
}
