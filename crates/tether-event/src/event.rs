//! The [`Event`] capability and its shared metadata.

use std::any::Any;
use std::fmt;

use tether_wire::{SerialBuffer, Side, WireError};

/// Wire-level event tag, mapped to a constructor by the
/// [`EventRegistry`](crate::EventRegistry). A separate space from entity
/// type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTag(pub u16);

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// Metadata every event carries. Embed one in each concrete event type
/// and hand it out through [`Event::meta`] / [`Event::meta_mut`].
#[derive(Debug, Clone, Default)]
pub struct EventMeta {
    from: Option<Side>,
    cancelled: bool,
    local_only: bool,
}

impl EventMeta {
    /// A fresh meta: no origin, not cancelled, replicated.
    pub fn new() -> Self {
        Self::default()
    }

    /// A meta for events that never leave this process.
    pub fn local() -> Self {
        Self {
            local_only: true,
            ..Self::default()
        }
    }

    /// The side the event originated on, once set.
    pub fn from(&self) -> Option<Side> {
        self.from
    }

    /// Stamps the origin. A no-op if the origin is already set, so
    /// re-dispatch on the receiving side cannot overwrite it.
    pub fn set_from(&mut self, side: Side) {
        if self.from.is_none() {
            self.from = Some(side);
        }
    }

    /// Whether a listener cancelled the event.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Cancels the event: it still finishes local dispatch but is never
    /// forwarded to the wire.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether the event is barred from the wire regardless of
    /// cancellation.
    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// Marks the event local-only.
    pub fn set_local_only(&mut self, local_only: bool) {
        self.local_only = local_only;
    }

    /// Whether the event should be queued for the wire after local
    /// dispatch.
    pub fn should_replicate(&self) -> bool {
        !self.cancelled && !self.local_only
    }
}

/// Capability implemented by every event type.
pub trait Event: Send {
    /// Wire tag; must be registered on the receiving side.
    fn tag(&self) -> EventTag;

    /// Shared metadata.
    fn meta(&self) -> &EventMeta;

    /// Mutable shared metadata.
    fn meta_mut(&mut self) -> &mut EventMeta;

    /// Serializes the event body (not the metadata — origin is implied
    /// by the receiving side, cancellation never travels).
    fn write(&self, buf: &mut SerialBuffer) -> Result<(), WireError>;

    /// Deserializes the event body into this instance.
    fn read(&mut self, buf: &mut SerialBuffer) -> Result<(), WireError>;

    /// Downcast support for listeners.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support for listeners.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
