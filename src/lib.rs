//! GlowLink — streaming RPC control link for the Glow LED controller.
//!
//! Lets the controller expose named, callable operations (effects,
//! configuration, status) to an external peer — a script, a browser, or
//! another device — over a long-lived HTTP chunked-transfer stream
//! carrying a JSON-RPC–style envelope.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Link Stack                           │
//! │                                                            │
//! │  ┌──────────┐   ┌─────────┐   ┌────────────────────────┐  │
//! │  │ Socket   │──▶│ Chunked │──▶│ StreamingTransport     │  │
//! │  │ (trait)  │   │ codec   │   │ (heartbeats filtered)  │  │
//! │  └──────────┘   └─────────┘   └───────────┬────────────┘  │
//! │       ▲                                   │ pull / push    │
//! │       │    ┌──────────────┐               ▼                │
//! │       │    │ Connection   │   ┌────────────────────────┐  │
//! │       └────│ (timeout,    │   │ RpcEngine (dispatcher) │  │
//! │            │  backoff)    │   │  → bound handlers      │  │
//! │            └──────────────┘   └────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is single-threaded and cooperative: the firmware's main
//! loop calls `transport.update(now)` then `engine.update(&mut transport,
//! now)` once per iteration, and nothing in the link blocks or spawns.
//!
//! ```no_run
//! use glowlink::{LinkConfig, Mode, RpcEngine, StreamingTransport, NullSocket};
//! use serde_json::json;
//!
//! let cfg = LinkConfig::default();
//! let mut engine = RpcEngine::new(&cfg);
//! engine.bind("get_brightness", |_params| Ok(json!(128)));
//! engine.bind_async(
//!     "run_effect",
//!     |sender, _params| {
//!         // hand `sender` to the effect scheduler; it calls
//!         // sender.send_final(..) when the effect completes
//!         let _ = sender;
//!         Ok(())
//!     },
//!     Mode::Async,
//! );
//!
//! let mut link = StreamingTransport::client(NullSocket, &cfg);
//! let mut now_ms = 0u64;
//! loop {
//!     link.update(now_ms, &mut ());
//!     engine.update(&mut link, now_ms);
//!     now_ms += 10;
//!     # break;
//! }
//! ```

#![deny(unused_must_use)]

pub mod chunked;
pub mod config;
pub mod connection;
pub mod engine;
pub mod message;
pub mod net;
pub mod transport;

mod error;

pub use config::LinkConfig;
pub use connection::{ConnStats, LinkDelegate, LinkState, Role};
pub use engine::{HandlerError, ResponseSender, RpcEngine, RpcStats};
pub use error::{FrameError, LinkError, Result, SendError, TransportError};
pub use message::{Heartbeat, Mode, RpcRequest, RpcResponse};
pub use net::TcpLinkSocket;
pub use transport::{
    LinkSocket, MessagePort, NullSocket, PeerSet, StreamingTransport, TransportStats, MAX_PEERS,
};
