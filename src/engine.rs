//! RPC engine — binds method names to handlers and runs the dispatch cycle.
//!
//! **Transport-decoupled**: the engine does not own a transport. Each
//! [`update`](RpcEngine::update) call pulls validated envelopes from a
//! [`MessagePort`], dispatches them, and flushes queued responses back
//! through the same port. The embedding firmware calls `update` once per
//! main-loop iteration; there are no internal threads and no blocking.
//!
//! Three call shapes:
//!
//! 1. **SYNC** — the handler returns its value inside the dispatching
//!    cycle; the peer sees one `Result`.
//! 2. **ASYNC** — the engine queues an `Ack` immediately; the handler
//!    keeps a [`ResponseSender`] and delivers one `Final` whenever it is
//!    ready (typically from a later timer-driven cycle).
//! 3. **ASYNC_STREAM** — as ASYNC, but any number of `Update` messages
//!    may precede the `Final`.
//!
//! Per id the peer always observes `Ack → Update* → (Final | Error)`;
//! the engine enforces this at send time by refusing anything after the
//! terminal message. The registry and pending-call table are owned by
//! one engine instance — several independent endpoints can coexist in
//! one process.

use core::cell::RefCell;
use core::fmt;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use log::{debug, warn};
use serde_json::Value;

use crate::config::LinkConfig;
use crate::error::SendError;
use crate::message::{
    CODE_INVALID_PARAMS, CODE_METHOD_NOT_FOUND, CODE_SERVER_ERROR, Mode, RpcRequest, RpcResponse,
};
use crate::transport::MessagePort;

// ───────────────────────────────────────────────────────────────
// Handler contracts
// ───────────────────────────────────────────────────────────────

/// Failure a handler reports instead of a value.
///
/// Anything a handler raises is caught at the dispatch boundary and
/// turned into a wire `Error`; the main loop never aborts because a
/// handler misbehaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The params did not match what the method expects (`-32602`).
    InvalidParams(&'static str),
    /// Any other handler failure (`-32000`).
    Fault(String),
}

impl HandlerError {
    fn code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) => CODE_INVALID_PARAMS,
            Self::Fault(_) => CODE_SERVER_ERROR,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParams(msg) => write!(f, "invalid params: {msg}"),
            Self::Fault(msg) => write!(f, "{msg}"),
        }
    }
}

/// SYNC handler: params in, value out, all within the dispatch cycle.
pub type SyncHandler = Box<dyn FnMut(&Value) -> core::result::Result<Value, HandlerError>>;

/// ASYNC / ASYNC_STREAM handler: invoked once per request with the
/// capability object for delivering results later.
pub type AsyncHandler =
    Box<dyn FnMut(ResponseSender, &Value) -> core::result::Result<(), HandlerError>>;

enum MethodKind {
    Sync(SyncHandler),
    /// `Mode::Async` or `Mode::AsyncStream`.
    Async(AsyncHandler, Mode),
}

// ───────────────────────────────────────────────────────────────
// Pending-call table
// ───────────────────────────────────────────────────────────────

/// Call progress after the `Ack`. A finished call is removed from the
/// table rather than parked in a `Done` state, so any later send finds
/// no slot and is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Acked,
    Streaming,
}

struct PendingCall {
    slot: u64,
    /// `None` for notifications: the handler runs, every send is
    /// swallowed, nothing reaches the wire.
    id: Option<Value>,
    mode: Mode,
    state: CallState,
}

/// Shared between the engine and every live [`ResponseSender`].
/// Single-threaded by contract; `RefCell` borrows are always short.
struct CallTable {
    calls: Vec<PendingCall>,
    outbox: VecDeque<RpcResponse>,
    next_slot: u64,
}

impl CallTable {
    fn new() -> Self {
        Self {
            calls: Vec::new(),
            outbox: VecDeque::new(),
            next_slot: 0,
        }
    }

    fn open(&mut self, id: Option<Value>, mode: Mode) -> u64 {
        let slot = self.next_slot;
        self.next_slot = self.next_slot.wrapping_add(1);
        self.calls.push(PendingCall {
            slot,
            id,
            mode,
            state: CallState::Acked,
        });
        slot
    }

    fn queue(&mut self, resp: RpcResponse) {
        self.outbox.push_back(resp);
    }

    fn index_of(&self, slot: u64) -> Option<usize> {
        self.calls.iter().position(|c| c.slot == slot)
    }

    /// Queue the terminal `Final` for a call and close it.
    fn finish(&mut self, slot: u64, value: Value) -> core::result::Result<(), SendError> {
        let idx = self.index_of(slot).ok_or(SendError::Terminated)?;
        let call = self.calls.swap_remove(idx);
        if let Some(id) = call.id {
            self.outbox.push_back(RpcResponse::Final { id, value });
        }
        Ok(())
    }

    /// Queue one `Update` for a streaming call.
    fn stream(&mut self, slot: u64, value: Value) -> core::result::Result<(), SendError> {
        let idx = self.index_of(slot).ok_or(SendError::Terminated)?;
        if self.calls[idx].mode != Mode::AsyncStream {
            // Misuse while the call is still open: the error can legally
            // be the terminal message, so it goes on the wire.
            let call = self.calls.swap_remove(idx);
            if let Some(id) = call.id {
                self.outbox.push_back(RpcResponse::Error {
                    id: Some(id),
                    code: CODE_SERVER_ERROR,
                    message: "update on non-streaming call".into(),
                });
            }
            return Err(SendError::NotStreaming);
        }
        let call = &mut self.calls[idx];
        call.state = CallState::Streaming;
        if let Some(id) = call.id.clone() {
            self.outbox.push_back(RpcResponse::Update { id, value });
        }
        Ok(())
    }

    /// Queue the terminal `Error` for a call and close it.
    fn fail(
        &mut self,
        slot: u64,
        code: i32,
        message: String,
    ) -> core::result::Result<(), SendError> {
        let idx = self.index_of(slot).ok_or(SendError::Terminated)?;
        let call = self.calls.swap_remove(idx);
        if let Some(id) = call.id {
            self.outbox.push_back(RpcResponse::Error {
                id: Some(id),
                code,
                message,
            });
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Response sender capability
// ───────────────────────────────────────────────────────────────

/// The capability an ASYNC / ASYNC_STREAM handler uses to deliver
/// delayed or streamed results. Cloneable; every copy refers to the same
/// pending call, and the one-terminal-per-id invariant is enforced where
/// the sends land, not by who holds the handle.
#[derive(Clone)]
pub struct ResponseSender {
    table: Rc<RefCell<CallTable>>,
    slot: u64,
}

impl ResponseSender {
    /// Deliver the terminal value. Equivalent to
    /// [`send_final`](Self::send_final).
    pub fn send(&self, value: Value) -> core::result::Result<(), SendError> {
        self.send_final(value)
    }

    /// Deliver the terminal value and close the call.
    pub fn send_final(&self, value: Value) -> core::result::Result<(), SendError> {
        let r = self.table.borrow_mut().finish(self.slot, value);
        if r.is_err() {
            warn!("RPC: send_final on terminated call (slot {})", self.slot);
        }
        r
    }

    /// Deliver one streamed element. ASYNC_STREAM calls only.
    pub fn send_update(&self, value: Value) -> core::result::Result<(), SendError> {
        let r = self.table.borrow_mut().stream(self.slot, value);
        if let Err(e) = r {
            warn!("RPC: send_update refused (slot {}): {e}", self.slot);
        }
        r
    }

    /// Deliver a terminal failure (`-32000`) and close the call.
    pub fn send_error(&self, message: &str) -> core::result::Result<(), SendError> {
        let r = self
            .table
            .borrow_mut()
            .fail(self.slot, CODE_SERVER_ERROR, message.to_owned());
        if r.is_err() {
            warn!("RPC: send_error on terminated call (slot {})", self.slot);
        }
        r
    }
}

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

/// Dispatch counters for diagnostics reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcStats {
    pub requests_dispatched: u32,
    pub unknown_methods: u32,
    /// Envelopes dropped at the boundary before becoming requests.
    pub malformed_dropped: u32,
    pub handler_faults: u32,
}

/// Method registry + pending-call bookkeeping for one RPC endpoint.
pub struct RpcEngine {
    methods: BTreeMap<String, MethodKind>,
    table: Rc<RefCell<CallTable>>,
    pull_budget: usize,
    stats: RpcStats,
}

impl RpcEngine {
    pub fn new(cfg: &LinkConfig) -> Self {
        Self {
            methods: BTreeMap::new(),
            table: Rc::new(RefCell::new(CallTable::new())),
            pull_budget: cfg.pull_budget,
            stats: RpcStats::default(),
        }
    }

    /// Register a SYNC method. The handler's return value becomes the
    /// `Result` for the request, within the same update cycle.
    pub fn bind<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&Value) -> core::result::Result<Value, HandlerError> + 'static,
    {
        self.insert(name, MethodKind::Sync(Box::new(handler)));
    }

    /// Register an ASYNC or ASYNC_STREAM method.
    ///
    /// The engine queues the `Ack` itself; the handler delivers the rest
    /// through the [`ResponseSender`] it receives, immediately or from
    /// any later cycle.
    ///
    /// # Panics
    ///
    /// `mode` must not be [`Mode::Sync`] — use [`bind`](Self::bind).
    pub fn bind_async<F>(&mut self, name: &str, handler: F, mode: Mode)
    where
        F: FnMut(ResponseSender, &Value) -> core::result::Result<(), HandlerError> + 'static,
    {
        assert!(mode != Mode::Sync, "use bind() for SYNC methods");
        self.insert(name, MethodKind::Async(Box::new(handler), mode));
    }

    fn insert(&mut self, name: &str, kind: MethodKind) {
        if self.methods.insert(name.to_owned(), kind).is_some() {
            warn!("RPC: method '{name}' re-bound, previous handler replaced");
        }
    }

    /// Whether a method name is bound.
    pub fn is_bound(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Calls that were acked but not yet terminated.
    pub fn pending_calls(&self) -> usize {
        self.table.borrow().calls.len()
    }

    /// Responses queued but not yet flushed.
    pub fn queued_responses(&self) -> usize {
        self.table.borrow().outbox.len()
    }

    pub fn stats(&self) -> RpcStats {
        self.stats
    }

    /// One dispatch cycle: pull up to the configured budget of requests,
    /// dispatch each, then flush every queued response. Returns the
    /// number of requests dispatched.
    ///
    /// This is the only call the embedding main loop must make; drive it
    /// once per iteration after the transport's own `update`.
    pub fn update(&mut self, port: &mut dyn MessagePort, now_ms: u64) -> usize {
        let mut dispatched = 0;

        for _ in 0..self.pull_budget {
            let Some(raw) = port.pull(now_ms) else { break };

            // Boundary validation: whatever does not parse into a request
            // is dropped here, producing no response and reaching no
            // handler.
            let Some(req) = RpcRequest::from_value(raw, now_ms) else {
                debug!("RPC: dropping malformed envelope");
                self.stats.malformed_dropped += 1;
                continue;
            };

            self.dispatch(req);
            dispatched += 1;
        }

        self.flush(port);
        dispatched
    }

    // ── Internal dispatch ─────────────────────────────────────

    fn dispatch(&mut self, req: RpcRequest) {
        self.stats.requests_dispatched += 1;

        let Some(kind) = self.methods.get_mut(&req.method) else {
            warn!("RPC: unknown method '{}'", req.method);
            self.stats.unknown_methods += 1;
            if let Some(id) = req.id {
                self.table.borrow_mut().queue(RpcResponse::Error {
                    id: Some(id),
                    code: CODE_METHOD_NOT_FOUND,
                    message: "method not found".into(),
                });
            }
            return;
        };

        match kind {
            MethodKind::Sync(handler) => {
                let outcome = handler(&req.params);
                let mut table = self.table.borrow_mut();
                match outcome {
                    Ok(value) => {
                        if let Some(id) = req.id {
                            table.queue(RpcResponse::Result { id, value });
                        }
                    }
                    Err(e) => {
                        self.stats.handler_faults += 1;
                        warn!("RPC: '{}' failed: {e}", req.method);
                        if let Some(id) = req.id {
                            table.queue(RpcResponse::Error {
                                id: Some(id),
                                code: e.code(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }

            MethodKind::Async(handler, mode) => {
                let mode = *mode;
                let slot = self.table.borrow_mut().open(req.id.clone(), mode);
                if let Some(id) = req.id {
                    self.table.borrow_mut().queue(RpcResponse::Ack { id });
                }

                let sender = ResponseSender {
                    table: Rc::clone(&self.table),
                    slot,
                };
                // No table borrow may be held here: the handler is free
                // to use the sender synchronously.
                if let Err(e) = handler(sender, &req.params) {
                    self.stats.handler_faults += 1;
                    warn!("RPC: '{}' failed: {e}", req.method);
                    // Close with the error unless the handler already
                    // delivered its terminal before failing.
                    let _ = self
                        .table
                        .borrow_mut()
                        .fail(slot, e.code(), e.to_string());
                }
            }
        }
    }

    fn flush(&mut self, port: &mut dyn MessagePort) {
        loop {
            let next = self.table.borrow_mut().outbox.pop_front();
            let Some(resp) = next else { break };
            if let Err(e) = port.push(&resp.to_value()) {
                // Connection loss: everything not yet flushed is gone.
                let mut table = self.table.borrow_mut();
                let lost = 1 + table.outbox.len();
                table.outbox.clear();
                warn!("RPC: link down, dropped {lost} queued response(s) ({e})");
                break;
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
