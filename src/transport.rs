//! Streaming transport — frames, heartbeats, and the engine-facing seam.
//!
//! Composes a [`Connection`] with the chunk codec and presents exactly two
//! operations to the RPC engine: `pull` (next decoded, non-heartbeat
//! message) and `push` (send one message). Heartbeat traffic is consumed
//! here — it touches the activity clock, a ping is answered with a pong,
//! and nothing of it ever reaches the engine.
//!
//! ```text
//! ┌──────────┐ bytes ┌──────────────┐ frames ┌───────────────┐
//! │ Socket   │──────▶│ ChunkDecoder │───────▶│ heartbeat     │──▶ pull()
//! │ (trait)  │       └──────────────┘        │ filter        │
//! │          │◀──────────── tx buffer ◀──────┴───────────────│◀── push()
//! └──────────┘                                               └── ping/pong
//! ```
//!
//! Outbound messages are staged in a byte buffer drained by the
//! non-blocking write pass in [`StreamingTransport::update`]; a buffer
//! exceeding `max_tx_bytes` tears the connection down rather than growing
//! without bound.

use log::{debug, warn};
use serde_json::Value;

use crate::chunked::{ChunkDecoder, encode_chunk};
use crate::config::LinkConfig;
use crate::connection::{Connection, LinkDelegate};
use crate::error::{Result, TransportError};
use crate::message::Heartbeat;

/// Server-role peer slots (one transport/connection pair each).
pub const MAX_PEERS: usize = 4;

/// Upper bound on socket reads per update pass.
const READS_PER_PASS: usize = 8;

const READ_BUF_SIZE: usize = 1024;

// ───────────────────────────────────────────────────────────────
// Socket port
// ───────────────────────────────────────────────────────────────

/// Byte-oriented, non-blocking socket channel.
///
/// Concrete implementations: TCP over WiFi on the controller, in-memory
/// pipes in tests. Supplied to the connection at construction; the link
/// never touches the network any other way.
pub trait LinkSocket {
    /// Error type for this socket.
    type Error: core::fmt::Debug;

    /// Dial (or re-dial) the peer. Client role only; accepted sockets
    /// never see this call.
    fn connect(&mut self) -> core::result::Result<(), Self::Error>;

    /// Read up to `buf.len()` bytes. Returns 0 if no data is available
    /// (non-blocking); an error means the session is dead.
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error>;

    /// Write `data`, returning the number of bytes actually accepted.
    fn write(&mut self, data: &[u8]) -> core::result::Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> core::result::Result<(), Self::Error>;

    /// Tear the session down. Idempotent.
    fn close(&mut self);
}

/// A null socket that discards all writes and never reads.
/// Useful as a default when no peer is wired up.
pub struct NullSocket;

impl LinkSocket for NullSocket {
    type Error = ();

    fn connect(&mut self) -> core::result::Result<(), ()> {
        Ok(())
    }

    fn read(&mut self, _buf: &mut [u8]) -> core::result::Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> core::result::Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> core::result::Result<(), ()> {
        Ok(())
    }

    fn close(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Engine-facing seam
// ───────────────────────────────────────────────────────────────

/// Request-source / response-sink pair the engine dispatches through.
///
/// The engine never sees bytes, chunks, or heartbeats — only whole JSON
/// documents that survived the transport boundary.
pub trait MessagePort {
    /// Next decoded, non-heartbeat message, if one is buffered.
    fn pull(&mut self, now_ms: u64) -> Option<Value>;

    /// Queue one message for the peer.
    fn push(&mut self, msg: &Value) -> Result<()>;
}

/// Frame/heartbeat counters for diagnostics reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    pub frames_rx: u32,
    pub frames_tx: u32,
    pub heartbeats_tx: u32,
    /// Frames dropped at the boundary (unparsable JSON).
    pub discarded: u32,
}

// ───────────────────────────────────────────────────────────────
// Streaming transport
// ───────────────────────────────────────────────────────────────

/// One peer's transport: connection + codec + outbound staging buffer.
pub struct StreamingTransport<S: LinkSocket> {
    conn: Connection<S>,
    decoder: ChunkDecoder,
    tx_buf: Vec<u8>,
    max_tx: usize,
    /// Set when the inbound stream went malformed inside `pull`; the next
    /// `update` tears the session down with the delegate present.
    defunct: bool,
    stats: TransportStats,
}

impl<S: LinkSocket> StreamingTransport<S> {
    /// Client-role transport. Call [`connect`](Self::connect) to dial.
    pub fn client(socket: S, cfg: &LinkConfig) -> Self {
        Self::wrap(Connection::new_client(socket, cfg.clone()), cfg)
    }

    /// Server-role transport over an already-accepted socket.
    pub fn accepted(socket: S, cfg: &LinkConfig, now_ms: u64) -> Self {
        Self::wrap(Connection::accepted(socket, cfg.clone(), now_ms), cfg)
    }

    fn wrap(conn: Connection<S>, cfg: &LinkConfig) -> Self {
        Self {
            conn,
            decoder: ChunkDecoder::new(cfg.max_frame_bytes),
            tx_buf: Vec::new(),
            max_tx: cfg.max_tx_bytes,
            defunct: false,
            stats: TransportStats::default(),
        }
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Dial the peer (client role).
    pub fn connect(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        self.conn.connect(now_ms, delegate);
    }

    /// Force-disconnect and suppress reconnection.
    pub fn disconnect(&mut self, delegate: &mut dyn LinkDelegate) {
        self.conn.disconnect(delegate);
        self.clear_session_buffers();
    }

    /// One transport pass: best-effort non-blocking read, connection
    /// bookkeeping (timeout, backoff, heartbeat), best-effort write.
    pub fn update(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        if self.defunct {
            self.defunct = false;
            self.conn.mark_lost(now_ms, delegate);
        }

        self.read_pass(now_ms, delegate);

        let tick = self.conn.update(now_ms, delegate);
        if tick.heartbeat_due {
            self.queue_frame(&Heartbeat::Ping.to_value());
            self.stats.heartbeats_tx += 1;
        }

        self.write_pass(now_ms, delegate);

        if !self.conn.is_connected() {
            self.clear_session_buffers();
        }
    }

    // ── MessagePort mechanics ─────────────────────────────────

    fn pull_inner(&mut self, now_ms: u64) -> Option<Value> {
        loop {
            let payload = match self.decoder.poll() {
                Ok(Some(p)) => p,
                Ok(None) => return None,
                Err(e) => {
                    warn!("NET: malformed chunk stream ({e}), tearing down");
                    self.defunct = true;
                    self.decoder.reset();
                    return None;
                }
            };

            self.stats.frames_rx += 1;
            let msg: Value = match serde_json::from_slice(&payload) {
                Ok(v) => v,
                Err(e) => {
                    debug!("NET: discarding unparsable frame ({e})");
                    self.stats.discarded += 1;
                    continue;
                }
            };

            if let Some(hb) = Heartbeat::classify(&msg) {
                self.conn.touch(now_ms);
                if hb == Heartbeat::Ping {
                    self.queue_frame(&Heartbeat::Pong.to_value());
                }
                continue;
            }

            return Some(msg);
        }
    }

    fn push_inner(&mut self, msg: &Value) -> Result<()> {
        if !self.conn.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        self.queue_frame(msg);
        if self.tx_buf.len() > self.max_tx {
            warn!("NET: outbound buffer stuck at {} bytes, tearing down", self.tx_buf.len());
            self.defunct = true;
            return Err(TransportError::TxOverflow.into());
        }
        self.drain_tx();
        Ok(())
    }

    // ── Internal passes ───────────────────────────────────────

    fn read_pass(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        if !self.conn.is_connected() {
            return;
        }
        let mut buf = [0u8; READ_BUF_SIZE];
        for _ in 0..READS_PER_PASS {
            match self.conn.socket_mut().read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    self.conn.touch(now_ms);
                    self.decoder.feed(&buf[..n]);
                }
                Err(e) => {
                    warn!("NET: read error ({e:?})");
                    self.conn.mark_lost(now_ms, delegate);
                    break;
                }
            }
        }
    }

    fn write_pass(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        if !self.conn.is_connected() || self.tx_buf.is_empty() {
            return;
        }
        if !self.drain_tx() {
            self.conn.mark_lost(now_ms, delegate);
        }
    }

    /// Write as much of the staging buffer as the socket accepts.
    /// Returns `false` on a socket error.
    fn drain_tx(&mut self) -> bool {
        while !self.tx_buf.is_empty() {
            match self.conn.socket_mut().write(&self.tx_buf) {
                Ok(0) => break, // would block, retry next pass
                Ok(n) => {
                    self.tx_buf.drain(..n);
                }
                Err(e) => {
                    warn!("NET: write error ({e:?})");
                    return false;
                }
            }
        }
        self.conn.socket_mut().flush().is_ok()
    }

    fn queue_frame(&mut self, msg: &Value) {
        let text = msg.to_string();
        encode_chunk(text.as_bytes(), &mut self.tx_buf);
        self.stats.frames_tx += 1;
    }

    /// A dead session must never leak a torn frame or stale responses
    /// into the next one.
    fn clear_session_buffers(&mut self) {
        self.decoder.reset();
        self.tx_buf.clear();
    }
}

impl<S: LinkSocket> MessagePort for StreamingTransport<S> {
    fn pull(&mut self, now_ms: u64) -> Option<Value> {
        self.pull_inner(now_ms)
    }

    fn push(&mut self, msg: &Value) -> Result<()> {
        self.push_inner(msg)
    }
}

// ───────────────────────────────────────────────────────────────
// Server-role peer set
// ───────────────────────────────────────────────────────────────

/// Independent transport/connection pairs, one per connected peer.
///
/// `pull` services the peers round-robin so one chatty client cannot
/// shadow the others; `push` broadcasts to every connected peer. Peers
/// whose session died are pruned on `update` — the server role never
/// reconnects, it just accepts fresh sockets.
pub struct PeerSet<S: LinkSocket> {
    peers: heapless::Vec<StreamingTransport<S>, MAX_PEERS>,
    cursor: usize,
}

impl<S: LinkSocket> PeerSet<S> {
    pub fn new() -> Self {
        Self {
            peers: heapless::Vec::new(),
            cursor: 0,
        }
    }

    /// Adopt an accepted socket. Hands the socket back when all peer
    /// slots are taken so the caller can close it.
    pub fn add_peer(
        &mut self,
        socket: S,
        cfg: &LinkConfig,
        now_ms: u64,
    ) -> core::result::Result<(), S> {
        if self.peers.is_full() {
            warn!("NET: peer slots full, rejecting connection");
            return Err(socket);
        }
        let t = StreamingTransport::accepted(socket, cfg, now_ms);
        // Capacity was checked above; this push cannot fail.
        let _ = self.peers.push(t);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Update every peer and prune dead sessions.
    pub fn update(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        for peer in &mut self.peers {
            peer.update(now_ms, delegate);
        }
        self.peers.retain(|p| p.is_connected());
        if self.cursor >= self.peers.len() {
            self.cursor = 0;
        }
    }
}

impl<S: LinkSocket> Default for PeerSet<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LinkSocket> MessagePort for PeerSet<S> {
    fn pull(&mut self, now_ms: u64) -> Option<Value> {
        let n = self.peers.len();
        if n == 0 {
            return None;
        }
        for i in 0..n {
            let idx = (self.cursor + i) % n;
            if let Some(msg) = self.peers[idx].pull(now_ms) {
                self.cursor = (idx + 1) % n;
                return Some(msg);
            }
        }
        None
    }

    fn push(&mut self, msg: &Value) -> Result<()> {
        let mut delivered = false;
        for peer in &mut self.peers {
            if peer.is_connected() && peer.push(msg).is_ok() {
                delivered = true;
            }
        }
        if delivered {
            Ok(())
        } else {
            Err(TransportError::NotConnected.into())
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
