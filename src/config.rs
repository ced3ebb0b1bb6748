//! Link configuration parameters
//!
//! All tunable parameters for the control link.
//! Values can be overridden via NVS or provisioning; the embedding
//! firmware persists them with the [`LinkConfig::to_bytes`] /
//! [`LinkConfig::from_bytes`] helpers.

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Control-link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    // --- Heartbeat ---
    /// Interval between heartbeat pings while connected (milliseconds)
    pub heartbeat_interval_ms: u64,
    /// Idle timeout before the peer is declared gone (milliseconds).
    /// Must be at least twice the heartbeat interval.
    pub timeout_ms: u64,

    // --- Reconnect (client role) ---
    /// Delay before the first reconnect attempt (milliseconds)
    pub initial_backoff_ms: u64,
    /// Ceiling for the doubling reconnect delay (milliseconds)
    pub max_backoff_ms: u64,

    // --- Framing ---
    /// Maximum bytes buffered while reassembling one chunk
    pub max_frame_bytes: usize,
    /// Maximum bytes staged for a non-blocking write before the
    /// connection is declared stuck and torn down
    pub max_tx_bytes: usize,

    // --- Dispatch ---
    /// Maximum requests dispatched per engine update cycle
    pub pull_budget: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            // Heartbeat
            heartbeat_interval_ms: 30_000,
            timeout_ms: 60_000,

            // Reconnect
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,

            // Framing
            max_frame_bytes: 16 * 1024,
            max_tx_bytes: 32 * 1024,

            // Dispatch
            pull_budget: 8,
        }
    }
}

impl LinkConfig {
    /// Validate invariant relationships between fields.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(LinkError::Config("heartbeat interval must be non-zero"));
        }
        if self.timeout_ms < self.heartbeat_interval_ms * 2 {
            return Err(LinkError::Config(
                "timeout must be at least twice the heartbeat interval",
            ));
        }
        if self.initial_backoff_ms == 0 || self.initial_backoff_ms > self.max_backoff_ms {
            return Err(LinkError::Config("backoff range invalid"));
        }
        if self.max_frame_bytes == 0 || self.pull_budget == 0 {
            return Err(LinkError::Config("frame size and pull budget must be non-zero"));
        }
        Ok(())
    }

    /// Serialise for NVS persistence.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        postcard::to_allocvec(self).ok()
    }

    /// Deserialise from NVS bytes. Returns `None` on a corrupted blob so
    /// the caller can fall back to defaults.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let cfg: Self = postcard::from_bytes(bytes).ok()?;
        cfg.validate().ok()?;
        Some(cfg)
    }
}
