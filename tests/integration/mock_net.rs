//! In-memory socket plumbing shared by the integration tests.
//!
//! A [`PipeSocket`] stands in for the controller's TCP session: the test
//! injects framed inbound bytes and inspects the frames the link wrote
//! back. An endpoint can be killed (reads/writes start failing) or have
//! its dial gate closed to script connect failures.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glowlink::LinkSocket;
use glowlink::chunked::{ChunkDecoder, encode_chunk};
use serde_json::Value;

type Shared = Rc<RefCell<Vec<u8>>>;

#[derive(Clone)]
pub struct PipeSocket {
    rx: Shared,
    tx: Shared,
    dead: Rc<Cell<bool>>,
    /// Whether `connect()` succeeds. Defaults to accepting.
    dial_ok: Rc<Cell<bool>>,
}

impl PipeSocket {
    /// Standalone endpoint; the test injects inbound bytes and inspects
    /// outbound ones directly.
    pub fn new() -> Self {
        Self {
            rx: Rc::new(RefCell::new(Vec::new())),
            tx: Rc::new(RefCell::new(Vec::new())),
            dead: Rc::new(Cell::new(false)),
            dial_ok: Rc::new(Cell::new(true)),
        }
    }

    pub fn set_dial_ok(&self, ok: bool) {
        self.dial_ok.set(ok);
    }

    /// Reads and writes start failing; a successful dial revives it.
    pub fn kill(&self) {
        self.dead.set(true);
    }

    /// Frame a JSON message and place it on this endpoint's inbound pipe.
    pub fn inject(&self, msg: &Value) {
        let text = msg.to_string();
        encode_chunk(text.as_bytes(), &mut self.rx.borrow_mut());
    }

    pub fn inject_raw(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend_from_slice(bytes);
    }

    /// Decode every message written to this endpoint so far and clear
    /// the record.
    pub fn drain_sent(&self) -> Vec<Value> {
        let mut decoder = ChunkDecoder::new(64 * 1024);
        decoder.feed(&self.tx.borrow());
        self.tx.borrow_mut().clear();

        let mut out = Vec::new();
        while let Ok(Some(payload)) = decoder.poll() {
            out.push(serde_json::from_slice(&payload).expect("test frames are valid JSON"));
        }
        out
    }
}

impl Default for PipeSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkSocket for PipeSocket {
    type Error = &'static str;

    fn connect(&mut self) -> Result<(), Self::Error> {
        if self.dial_ok.get() {
            self.dead.set(false);
            Ok(())
        } else {
            Err("refused")
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.dead.get() {
            return Err("dead");
        }
        let mut rx = self.rx.borrow_mut();
        let n = rx.len().min(buf.len());
        buf[..n].copy_from_slice(&rx[..n]);
        rx.drain(..n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        if self.dead.get() {
            return Err("dead");
        }
        self.tx.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn close(&mut self) {}
}
