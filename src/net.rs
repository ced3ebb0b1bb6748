//! TCP socket adapter.
//!
//! Implements [`LinkSocket`] over `std::net::TcpStream` in non-blocking
//! mode. Works unchanged on the host and on ESP-IDF targets (both ship
//! `std::net`); tests and simulators use in-memory pipes instead.
//!
//! The adapter owns the dial address so the client role can re-dial the
//! same peer from the backoff state machine without outside help. An
//! accepted server-side stream is wrapped as-is and never re-dialled.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use log::{info, warn};

use crate::transport::LinkSocket;

/// TCP implementation of the link's socket port.
pub struct TcpLinkSocket {
    addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
}

impl TcpLinkSocket {
    /// Client-role socket: dials `addr` on every `connect()`.
    pub fn dialer(addr: SocketAddr) -> Self {
        Self {
            addr: Some(addr),
            stream: None,
        }
    }

    /// Server-role socket wrapping an accepted stream.
    /// Fails if the stream cannot be switched to non-blocking mode.
    pub fn from_accepted(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            addr: None,
            stream: Some(stream),
        })
    }
}

impl LinkSocket for TcpLinkSocket {
    type Error = io::Error;

    fn connect(&mut self) -> io::Result<()> {
        let Some(addr) = self.addr else {
            // Accepted sockets cannot be re-dialled.
            return Err(io::Error::from(io::ErrorKind::Unsupported));
        };
        let stream = TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        info!("NET: connected to {addr}");
        self.stream = Some(stream);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        match stream.read(buf) {
            // A clean EOF is still a dead session for a long-lived stream.
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.shutdown(std::net::Shutdown::Both) {
                // Already-reset peers land here; nothing left to do.
                warn!("NET: shutdown failed ({e})");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
