//! Error types for the transport layer.

use std::time::Duration;

/// Errors that can occur on a link.
///
/// [`Timeout`](TransportError::Timeout) and
/// [`Protocol`](TransportError::Protocol) are fatal: the link is broken and
/// the owning driver must tear it down. [`Connect`](TransportError::Connect)
/// is recoverable — the caller may retry dialing.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Establishing the channel failed (refused, unresolvable, dial
    /// deadline exceeded).
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// An I/O deadline was exceeded mid-operation. The link must be torn
    /// down; bytes may have been half-sent.
    #[error("i/o deadline exceeded after {waited:?}")]
    Timeout {
        /// The configured deadline that was exceeded.
        waited: Duration,
    },

    /// The peer sent a malformed frame: impossible body length or a
    /// checksum mismatch. The peer is untrusted from here on.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The socket failed underneath us (reset, EOF mid-frame).
    #[error("i/o failed: {0}")]
    Io(#[source] std::io::Error),

    /// A local framing error while building the outgoing packet.
    #[error("framing failed: {0}")]
    Frame(#[from] tether_wire::WireError),

    /// `send`/`receive` on a link that is not connected.
    #[error("link is not connected")]
    NotConnected,
}

impl TransportError {
    /// Whether this error means the link is unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Connect(_))
    }
}
