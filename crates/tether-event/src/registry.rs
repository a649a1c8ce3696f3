//! Event constructors and the wire codec.
//!
//! Event control-record payload: `tag u16 | event body`.

use std::collections::HashMap;

use tether_wire::{SerialBuffer, Side};

use crate::{Event, EventError, EventTag};

type Constructor = Box<dyn Fn() -> Box<dyn Event> + Send + Sync>;

/// Maps event tags to constructors for the receiving side.
pub struct EventRegistry {
    constructors: HashMap<EventTag, Constructor>,
}

impl EventRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor for `tag`, replacing any previous one.
    pub fn register<F>(&mut self, tag: EventTag, ctor: F)
    where
        F: Fn() -> Box<dyn Event> + Send + Sync + 'static,
    {
        self.constructors.insert(tag, Box::new(ctor));
    }

    /// Constructs a blank event for `tag`.
    pub fn create(&self, tag: EventTag) -> Result<Box<dyn Event>, EventError> {
        self.constructors
            .get(&tag)
            .map(|ctor| ctor())
            .ok_or(EventError::UnknownEvent(tag))
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes an event into a control-record payload.
pub fn encode_event(event: &dyn Event) -> Result<Vec<u8>, EventError> {
    let mut buf = SerialBuffer::with_capacity(u16::MAX as usize);
    buf.put_u16(event.tag().0).map_err(EventError::Encode)?;
    event.write(&mut buf).map_err(EventError::Encode)?;
    Ok(buf.as_written().to_vec())
}

/// Decodes a received control-record payload into a live event, with its
/// origin stamped to the remote side.
pub fn decode_event(
    registry: &EventRegistry,
    payload: &[u8],
    from: Side,
) -> Result<Box<dyn Event>, EventError> {
    let mut buf = SerialBuffer::with_capacity(payload.len().max(1));
    buf.load(payload).map_err(EventError::Decode)?;
    let tag = EventTag(buf.get_u16().map_err(EventError::Decode)?);
    let mut event = registry.create(tag)?;
    event.read(&mut buf).map_err(EventError::Decode)?;
    event.meta_mut().set_from(from);
    Ok(event)
}

// =========================================================================
// Tests
// =========================================================================
