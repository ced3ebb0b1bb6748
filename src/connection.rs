//! Connection session bookkeeping for exactly one peer.
//!
//! Tracks the activity clock, schedules heartbeats, detects idle
//! timeouts, and (client role) runs the reconnect/backoff state machine:
//!
//! ```text
//!              connect ok                    timeout / socket error
//! Disconnected ──────────▶ Connected ──────────────────────────┐
//!      ▲    │ connect err      ▲                               │
//!      │    ▼                  │ retry ok                      ▼ (client)
//!      │  Backoff ◀────────────┴───────── retry err ──────── Backoff
//!      │    │
//!      └────┘ disconnect()
//! ```
//!
//! The reconnect delay starts at `initial_backoff_ms`, doubles on every
//! failed attempt, and is capped at `max_backoff_ms`; any successful
//! connect resets it. Retries continue until [`Connection::disconnect`]
//! is called. The server role has no backoff — a dead client socket is
//! simply dropped and future connections are accepted independently.
//!
//! All methods take `now` in milliseconds from the caller's clock; the
//! connection never reads time itself.

use log::{info, warn};

use crate::config::LinkConfig;
use crate::transport::LinkSocket;

// ───────────────────────────────────────────────────────────────
// Session state
// ───────────────────────────────────────────────────────────────

/// Which side of the link this connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dials the peer and reconnects with backoff after a loss.
    Client,
    /// Wraps an already-accepted socket; never reconnects.
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

/// Lifecycle callbacks, invoked from within [`Connection::update`].
///
/// The embedding firmware implements this to re-announce subscriptions,
/// flash a status LED, etc. `()` is a no-op implementation.
pub trait LinkDelegate {
    fn on_connected(&mut self) {}
    fn on_disconnected(&mut self) {}
}

impl LinkDelegate for () {}

/// What one [`Connection::update`] pass decided.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tick {
    /// The heartbeat interval elapsed; the transport owes the peer a ping.
    pub heartbeat_due: bool,
}

/// Session counters for diagnostics reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnStats {
    pub reconnect_attempts: u32,
    pub idle_timeouts: u32,
}

// ───────────────────────────────────────────────────────────────
// Connection
// ───────────────────────────────────────────────────────────────

/// One peer's socket-level session.
pub struct Connection<S: LinkSocket> {
    socket: S,
    role: Role,
    state: LinkState,
    cfg: LinkConfig,
    last_activity_ms: u64,
    last_heartbeat_ms: u64,
    backoff_ms: u64,
    retry_at_ms: u64,
    /// Set by `disconnect()`; suppresses automatic reconnection.
    hold_down: bool,
    stats: ConnStats,
}

impl<S: LinkSocket> Connection<S> {
    /// Client-role connection. Starts `Disconnected`; call
    /// [`connect`](Self::connect) to dial.
    pub fn new_client(socket: S, cfg: LinkConfig) -> Self {
        Self::with_role(socket, cfg, Role::Client, LinkState::Disconnected, 0)
    }

    /// Server-role connection over an already-accepted socket.
    pub fn accepted(socket: S, cfg: LinkConfig, now_ms: u64) -> Self {
        info!("LINK: peer accepted");
        Self::with_role(socket, cfg, Role::Server, LinkState::Connected, now_ms)
    }

    fn with_role(socket: S, cfg: LinkConfig, role: Role, state: LinkState, now_ms: u64) -> Self {
        let backoff = cfg.initial_backoff_ms;
        Self {
            socket,
            role,
            state,
            cfg,
            last_activity_ms: now_ms,
            last_heartbeat_ms: now_ms,
            backoff_ms: backoff,
            retry_at_ms: 0,
            hold_down: false,
            stats: ConnStats::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Current reconnect delay (client role).
    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }

    pub fn stats(&self) -> ConnStats {
        self.stats
    }

    /// The raw socket, for the transport's read/write passes.
    pub(crate) fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    /// Mark peer activity. Called for every received byte, heartbeats
    /// included.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    /// Dial the peer (client role). On failure the connection enters
    /// `Backoff` and [`update`](Self::update) retries automatically.
    pub fn connect(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        if self.role != Role::Client || self.state == LinkState::Connected {
            return;
        }
        self.hold_down = false;
        self.state = LinkState::Connecting;
        match self.socket.connect() {
            Ok(()) => self.enter_connected(now_ms, delegate),
            Err(e) => {
                warn!("LINK: connect failed ({e:?}), backoff {}ms", self.backoff_ms);
                self.enter_backoff(now_ms);
            }
        }
    }

    /// Force `Disconnected` and suppress automatic reconnection.
    pub fn disconnect(&mut self, delegate: &mut dyn LinkDelegate) {
        let was_connected = self.state == LinkState::Connected;
        self.socket.close();
        self.state = LinkState::Disconnected;
        self.hold_down = true;
        info!("LINK: disconnected (explicit)");
        if was_connected {
            delegate.on_disconnected();
        }
    }

    /// React to a socket-level failure reported by the transport.
    pub(crate) fn mark_lost(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        if self.state != LinkState::Connected {
            return;
        }
        warn!("LINK: connection lost");
        self.drop_session(now_ms, delegate);
    }

    /// One bookkeeping pass: timeout detection, heartbeat scheduling,
    /// backoff-driven reconnection.
    pub fn update(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) -> Tick {
        let mut tick = Tick::default();

        match self.state {
            LinkState::Connected => {
                if now_ms.saturating_sub(self.last_activity_ms) > self.cfg.timeout_ms {
                    self.stats.idle_timeouts += 1;
                    warn!(
                        "LINK: peer idle for {}ms, dropping",
                        now_ms.saturating_sub(self.last_activity_ms)
                    );
                    self.drop_session(now_ms, delegate);
                } else if now_ms.saturating_sub(self.last_heartbeat_ms)
                    >= self.cfg.heartbeat_interval_ms
                {
                    self.last_heartbeat_ms = now_ms;
                    tick.heartbeat_due = true;
                }
            }

            LinkState::Backoff => {
                if now_ms >= self.retry_at_ms {
                    self.stats.reconnect_attempts += 1;
                    match self.socket.connect() {
                        Ok(()) => self.enter_connected(now_ms, delegate),
                        Err(e) => {
                            self.backoff_ms =
                                (self.backoff_ms * 2).min(self.cfg.max_backoff_ms);
                            self.retry_at_ms = now_ms + self.backoff_ms;
                            warn!(
                                "LINK: reconnect attempt {} failed ({e:?}), next in {}ms",
                                self.stats.reconnect_attempts, self.backoff_ms
                            );
                        }
                    }
                }
            }

            LinkState::Disconnected | LinkState::Connecting => {}
        }

        tick
    }

    // ── State transitions ─────────────────────────────────────

    fn enter_connected(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        self.state = LinkState::Connected;
        self.backoff_ms = self.cfg.initial_backoff_ms;
        self.last_activity_ms = now_ms;
        self.last_heartbeat_ms = now_ms;
        info!("LINK: connected");
        delegate.on_connected();
    }

    fn enter_backoff(&mut self, now_ms: u64) {
        self.state = LinkState::Backoff;
        self.retry_at_ms = now_ms + self.backoff_ms;
    }

    fn drop_session(&mut self, now_ms: u64, delegate: &mut dyn LinkDelegate) {
        self.socket.close();
        self.state = LinkState::Disconnected;
        delegate.on_disconnected();

        if self.role == Role::Client && !self.hold_down {
            self.backoff_ms = self.cfg.initial_backoff_ms;
            self.enter_backoff(now_ms);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
