//! JSON-RPC envelope model.
//!
//! Plain data shared by the transport and the engine: the request
//! envelope, the tagged response union, the call-mode tag, and the
//! reserved heartbeat shapes. Envelope validation lives here so that the
//! engine only ever sees fully-formed [`RpcRequest`] values — anything
//! malformed is rejected at the boundary and never reaches a handler.
//!
//! Wire shapes:
//!
//! ```text
//! request   {"jsonrpc":"2.0","method":"run_effect","params":[..],"id":1}
//! result    {"jsonrpc":"2.0","result":<value>,"id":1}
//! error     {"jsonrpc":"2.0","error":{"code":-32601,"message":".."},"id":1}
//! ack       {"result":{"ack":true},"id":1}
//! update    {"result":{"update":<value>},"id":1}
//! final     {"result":{"value":<value>,"stop":true},"id":1}
//! heartbeat {"ping":true} / {"pong":true}
//! ```

use serde_json::{Value, json};

// ── JSON-RPC error codes ─────────────────────────────────────

/// Method name not present in the registry.
pub const CODE_METHOD_NOT_FOUND: i32 = -32601;
/// Parameters rejected by the handler.
pub const CODE_INVALID_PARAMS: i32 = -32602;
/// Handler fault caught at the dispatch boundary.
pub const CODE_SERVER_ERROR: i32 = -32000;

// ── Call modes ───────────────────────────────────────────────

/// How a bound method produces its response(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Handler returns its value inside the dispatching update cycle.
    Sync,
    /// Handler is acked immediately and delivers exactly one `Final` later.
    Async,
    /// Handler is acked immediately, then `Update`* followed by one `Final`.
    AsyncStream,
}

// ── Request envelope ─────────────────────────────────────────

/// A validated inbound request. Immutable once constructed; owned by the
/// engine for the duration of dispatch.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Method name to dispatch on.
    pub method: String,
    /// Positional array or keyed object; `Null` when the peer sent none.
    pub params: Value,
    /// Client-chosen opaque token. `None` marks a notification — no
    /// response is owed, even on failure.
    pub id: Option<Value>,
    /// Local clock at the moment the envelope was pulled.
    pub received_at_ms: u64,
}

impl RpcRequest {
    /// Validate a decoded JSON document into a request.
    ///
    /// Returns `None` for anything that must be dropped at the boundary:
    /// non-objects, a missing or non-string `method`, params that are
    /// neither array nor object. A JSON `null` id is treated as absent.
    pub fn from_value(v: Value, now_ms: u64) -> Option<Self> {
        let obj = v.as_object()?;

        let method = obj.get("method")?.as_str()?;
        if method.is_empty() {
            return None;
        }

        let params = match obj.get("params") {
            None | Some(Value::Null) => Value::Null,
            Some(p @ (Value::Array(_) | Value::Object(_))) => p.clone(),
            Some(_) => return None,
        };

        let id = match obj.get("id") {
            None | Some(Value::Null) => None,
            Some(other) => Some(other.clone()),
        };

        Some(Self {
            method: method.to_owned(),
            params,
            id,
            received_at_ms: now_ms,
        })
    }

    /// Whether the peer expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

// ── Response union ───────────────────────────────────────────

/// Tagged response union.
///
/// For a given id at most one terminal variant (`Result`, `Final`,
/// `Error`) is ever produced, and it is always the last message queued
/// for that id. The engine enforces this at send time.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    /// Immediate result of a SYNC call.
    Result { id: Value, value: Value },
    /// Receipt for an ASYNC / ASYNC_STREAM call.
    Ack { id: Value },
    /// One streamed element of an ASYNC_STREAM call.
    Update { id: Value, value: Value },
    /// Terminal value of an ASYNC / ASYNC_STREAM call.
    Final { id: Value, value: Value },
    /// Terminal failure. `id` is `None` only for errors that cannot be
    /// attributed to a request.
    Error {
        id: Option<Value>,
        code: i32,
        message: String,
    },
}

impl RpcResponse {
    /// The id this response belongs to, if any.
    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Result { id, .. }
            | Self::Ack { id }
            | Self::Update { id, .. }
            | Self::Final { id, .. } => Some(id),
            Self::Error { id, .. } => id.as_ref(),
        }
    }

    /// Terminal responses close the call; nothing may follow them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Result { .. } | Self::Final { .. } | Self::Error { .. }
        )
    }

    /// Serialise to the wire shape.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Result { id, value } => json!({
                "jsonrpc": "2.0",
                "result": value,
                "id": id,
            }),
            Self::Ack { id } => json!({
                "result": { "ack": true },
                "id": id,
            }),
            Self::Update { id, value } => json!({
                "result": { "update": value },
                "id": id,
            }),
            Self::Final { id, value } => json!({
                "result": { "value": value, "stop": true },
                "id": id,
            }),
            Self::Error { id, code, message } => json!({
                "jsonrpc": "2.0",
                "error": { "code": code, "message": message },
                "id": id.clone().unwrap_or(Value::Null),
            }),
        }
    }
}

// ── Heartbeats ───────────────────────────────────────────────

/// The two reserved keep-alive shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    Ping,
    Pong,
}

impl Heartbeat {
    /// Classify a decoded document as a heartbeat, if it is one.
    /// Heartbeats carry no id and are never answered as RPC.
    pub fn classify(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        if obj.get("ping").and_then(Value::as_bool) == Some(true) {
            return Some(Self::Ping);
        }
        if obj.get("pong").and_then(Value::as_bool) == Some(true) {
            return Some(Self::Pong);
        }
        None
    }

    /// Wire form of this heartbeat.
    pub fn to_value(self) -> Value {
        match self {
            Self::Ping => json!({ "ping": true }),
            Self::Pong => json!({ "pong": true }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
