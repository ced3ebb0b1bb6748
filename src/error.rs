//! Unified error types for the GlowLink control link.
//!
//! Follows embedded best practice: a single `LinkError` enum that every
//! subsystem can convert into, keeping the embedding firmware's error
//! handling uniform. All variants are `Copy` so they can be cheaply passed
//! through the link state machine without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level link error
// ---------------------------------------------------------------------------

/// Every fallible operation in the link funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The socket-level session failed.
    Transport(TransportError),
    /// The chunked byte stream could not be framed.
    Frame(FrameError),
    /// A `ResponseSender` was used incorrectly.
    Send(SendError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Send(e) => write!(f, "send: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Socket-level failures. These drive the connection state machine into
/// `Backoff`/`Disconnected`; they never reach the RPC engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The peer refused or dropped the connection attempt.
    ConnectFailed,
    /// A non-blocking read returned an error or end-of-stream.
    ReadFailed,
    /// A non-blocking write returned an error.
    WriteFailed,
    /// An operation requires a connected session.
    NotConnected,
    /// The outbound staging buffer exceeded its configured cap.
    TxOverflow,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::NotConnected => write!(f, "not connected"),
            Self::TxOverflow => write!(f, "outbound buffer overflow"),
        }
    }
}

impl From<TransportError> for LinkError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Framing errors
// ---------------------------------------------------------------------------

/// Chunked-transfer framing failures.
///
/// A `FrameError` means the inbound byte stream is unrecoverable and the
/// connection must be torn down. Partial data is never an error — the
/// decoder simply waits for more bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The chunk size line is not valid hexadecimal, or grew past any
    /// plausible length without terminating.
    BadSizeLine,
    /// A declared chunk length exceeds the configured maximum buffer.
    Oversized,
    /// A chunk terminator (CRLF) was missing where required.
    BadTerminator,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSizeLine => write!(f, "invalid chunk size line"),
            Self::Oversized => write!(f, "chunk exceeds maximum size"),
            Self::BadTerminator => write!(f, "missing chunk terminator"),
        }
    }
}

impl From<FrameError> for LinkError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Response-sender errors
// ---------------------------------------------------------------------------

/// Local misuse of a [`ResponseSender`](crate::engine::ResponseSender).
///
/// `Terminated` is returned rather than emitting a wire `Error`: the
/// terminal message for that id has already been queued, and a second
/// terminal would violate the per-id ordering invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The call already received its terminal response.
    Terminated,
    /// `send_update` was called on a non-streaming call. The engine queues
    /// the wire `Error` terminal for the call.
    NotStreaming,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => write!(f, "call already terminated"),
            Self::NotStreaming => write!(f, "update on non-streaming call"),
        }
    }
}

impl From<SendError> for LinkError {
    fn from(e: SendError) -> Self {
        Self::Send(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Link-wide `Result` alias.
pub type Result<T> = core::result::Result<T, LinkError>;
