//! Connection-lifecycle behaviour observed through the transport.
//!
//! Covers the idle-timeout detector, the client-role reconnect backoff
//! ladder, and the heartbeat exchange that keeps a quiet link alive.

use glowlink::{LinkConfig, LinkDelegate, LinkState, MessagePort, StreamingTransport};
use serde_json::json;

use crate::mock_net::PipeSocket;

#[derive(Default)]
struct Recorder {
    connects: u32,
    disconnects: u32,
}

impl LinkDelegate for Recorder {
    fn on_connected(&mut self) {
        self.connects += 1;
    }
    fn on_disconnected(&mut self) {
        self.disconnects += 1;
    }
}

#[test]
fn backoff_ladder_then_reset_on_success() {
    let cfg = LinkConfig::default();
    let sock = PipeSocket::new();
    sock.set_dial_ok(false);
    let mut link = StreamingTransport::client(sock.clone(), &cfg);
    let mut d = Recorder::default();

    link.connect(0, &mut d);
    assert_eq!(link.connection().state(), LinkState::Backoff);

    // Observed delays: 1000, 2000, 4000, 8000, 16000, 30000, 30000, …
    let mut now = 0;
    let mut delays = vec![link.connection().backoff_ms()];
    for _ in 0..6 {
        now += link.connection().backoff_ms();
        link.update(now, &mut d);
        delays.push(link.connection().backoff_ms());
    }
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    assert_eq!(d.connects, 0);

    // The peer comes back; the next retry succeeds and resets the ladder.
    sock.set_dial_ok(true);
    now += link.connection().backoff_ms();
    link.update(now, &mut d);
    assert!(link.is_connected());
    assert_eq!(link.connection().backoff_ms(), 1000);
    assert_eq!(d.connects, 1);
}

#[test]
fn silence_times_out_once_and_restarts_backoff_at_the_floor() {
    let cfg = LinkConfig::default();
    let sock = PipeSocket::new();
    let mut link = StreamingTransport::client(sock.clone(), &cfg);
    let mut d = Recorder::default();

    link.connect(0, &mut d);
    assert!(link.is_connected());

    // Ratchet the backoff up with a first outage…
    sock.set_dial_ok(false);
    sock.kill();
    link.update(1, &mut d); // read error → loss
    assert_eq!(d.disconnects, 1);
    let mut now = 1;
    for _ in 0..3 {
        now += link.connection().backoff_ms();
        link.update(now, &mut d);
    }
    assert_eq!(link.connection().backoff_ms(), 8000);

    // …reconnect, then let the link idle out: the backoff must restart
    // at the floor, not where the ladder left off.
    sock.set_dial_ok(true);
    now += link.connection().backoff_ms();
    link.update(now, &mut d);
    assert!(link.is_connected());

    let quiet_deadline = now + cfg.timeout_ms + 1;
    link.update(quiet_deadline, &mut d);
    assert!(!link.is_connected());
    assert_eq!(d.disconnects, 2);
    assert_eq!(link.connection().state(), LinkState::Backoff);
    assert_eq!(link.connection().backoff_ms(), 1000);
}

#[test]
fn inbound_traffic_defers_the_timeout() {
    let cfg = LinkConfig::default();
    let sock = PipeSocket::new();
    let mut link = StreamingTransport::accepted(sock.clone(), &cfg, 0);
    let mut d = Recorder::default();

    // Frames arriving at 50s reset the activity clock.
    sock.inject(&json!({"ping":true}));
    link.update(50_000, &mut d);

    link.update(110_000, &mut d);
    assert!(link.is_connected(), "alive 60s after last activity");
    link.update(110_001, &mut d);
    assert!(!link.is_connected());
    assert_eq!(d.disconnects, 1);
}

#[test]
fn pings_flow_every_interval_while_connected() {
    let cfg = LinkConfig::default();
    let sock = PipeSocket::new();
    let mut link = StreamingTransport::accepted(sock.clone(), &cfg, 0);

    // Keep the peer chatty so the idle detector stays quiet.
    for step in 1..=4u64 {
        sock.inject(&json!({"pong":true}));
        link.update(step * cfg.heartbeat_interval_ms, &mut ());
        let _ = link.pull(step * cfg.heartbeat_interval_ms);
    }

    let pings = sock
        .drain_sent()
        .into_iter()
        .filter(|m| m == &json!({"ping":true}))
        .count();
    assert_eq!(pings, 4);
    assert_eq!(link.stats().heartbeats_tx, 4);
}

#[test]
fn explicit_disconnect_holds_the_link_down() {
    let cfg = LinkConfig::default();
    let sock = PipeSocket::new();
    let mut link = StreamingTransport::client(sock, &cfg);
    let mut d = Recorder::default();

    link.connect(0, &mut d);
    link.disconnect(&mut d);
    assert_eq!(link.connection().state(), LinkState::Disconnected);

    for t in [1_000u64, 5_000, 60_000, 600_000] {
        link.update(t, &mut d);
        assert_eq!(link.connection().state(), LinkState::Disconnected);
    }
    assert_eq!(link.connection().stats().reconnect_attempts, 0);

    // A fresh explicit connect is still allowed.
    link.connect(700_000, &mut d);
    assert!(link.is_connected());
}
