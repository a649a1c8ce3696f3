//! Error types for the event layer.

use crate::EventTag;

/// Errors that can occur while encoding or decoding events.
///
/// Per-event failures are isolated by the caller (a bad event is dropped
/// and logged); nothing here is fatal to a connection.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// No constructor registered for this tag on the receiving side.
    #[error("no constructor registered for {0}")]
    UnknownEvent(EventTag),

    /// The event body did not fit or failed to serialize.
    #[error("event failed to encode: {0}")]
    Encode(#[source] tether_wire::WireError),

    /// The received payload does not decode as this event type.
    #[error("malformed event payload: {0}")]
    Decode(#[source] tether_wire::WireError),
}
