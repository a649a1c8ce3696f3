//! Framed point-to-point transport for Tether.
//!
//! Every packet on the wire is a fixed 6-byte header — `i32` body length,
//! `u16` Fletcher-16 checksum, both big-endian — followed by exactly that
//! many body bytes. The explicit length lets the receiver read one packet
//! without scanning; the [`Opcode::End`](tether_wire::Opcode::End) sentinel
//! inside the body lets the protocol layer parse a self-describing record
//! stream without per-record framing.
//!
//! A [`Link`] is one side of a connection. It owns its socket and its read
//! and write [`SerialBuffer`]s exclusively — links are never shared between
//! tasks; cross-task access goes through the owning task's dispatcher.
//!
//! ```text
//! DISCONNECTED → CONNECTING → CONNECTED → DISCONNECTED
//! ```
//!
//! Disconnect is synchronous and immediate from the caller's point of view;
//! there is no draining state. I/O deadline overruns and malformed frames
//! are fatal to the link, never retried.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{TcpLink, TcpTransport};

use std::fmt;
use std::time::Duration;

use tether_wire::{DEFAULT_MAX_BODY_LEN, SerialBuffer};

/// Opaque identifier for a link, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Connection lifecycle state of a [`Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No channel. The initial and terminal state.
    #[default]
    Disconnected,
    /// Dialing; no I/O possible yet.
    Connecting,
    /// Channel established; `send`/`receive` are legal.
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Tuning knobs for one link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Wall-clock deadline for one complete `send` or `receive`.
    /// Exceeding it is fatal to the link.
    pub io_timeout: Duration,
    /// Hard cap on announced body length. A header above this is a
    /// protocol violation, rejected before any body byte is read.
    pub max_body_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(5),
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }
}

/// One side of a framed connection.
///
/// The concrete stream implementation is [`TcpLink`]; the trait is the seam
/// the per-connection drivers are written against.
pub trait Link: Send {
    /// Current lifecycle state.
    fn state(&self) -> LinkState;

    /// This link's process-unique id.
    fn id(&self) -> ConnectionId;

    /// The outgoing body under construction. Protocol layers append
    /// records here between sends.
    fn write_buffer(&mut self) -> &mut SerialBuffer;

    /// The body of the last received packet, positioned at its start.
    fn read_buffer(&mut self) -> &mut SerialBuffer;

    /// Terminates the outgoing body, frames it, and writes header + body
    /// to the peer under the configured deadline. Clears the write buffer
    /// on success.
    async fn send(&mut self) -> Result<(), TransportError>;

    /// Reads exactly one framed packet under the configured deadline and
    /// verifies its checksum. On success the read buffer holds the body,
    /// flipped for the protocol layer.
    async fn receive(&mut self) -> Result<(), TransportError>;

    /// Closes the channel. Idempotent.
    async fn disconnect(&mut self);
}
