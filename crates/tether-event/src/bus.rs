//! The listener bus.

use tether_replication::World;

use crate::{Event, EventTag};

/// An event listener. Runs on the simulation loop with access to the
/// live world.
pub type Listener = Box<dyn FnMut(&mut World, &mut dyn Event) + Send>;

/// Listener registrations for one peer.
///
/// A listener subscribes to one tag or to every event (the source's
/// supertype matching, rendered as tag-or-wildcard). Dispatch runs
/// matching listeners in registration order; cancellation stops the
/// event from reaching the wire, not the remaining listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(Option<EventTag>, Listener)>,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to events with `tag`.
    pub fn subscribe<F>(&mut self, tag: EventTag, listener: F)
    where
        F: FnMut(&mut World, &mut dyn Event) + Send + 'static,
    {
        self.listeners.push((Some(tag), Box::new(listener)));
    }

    /// Subscribes to every event.
    pub fn subscribe_all<F>(&mut self, listener: F)
    where
        F: FnMut(&mut World, &mut dyn Event) + Send + 'static,
    {
        self.listeners.push((None, Box::new(listener)));
    }

    /// Runs all matching listeners against `event` in registration order.
    pub fn dispatch(&mut self, world: &mut World, event: &mut dyn Event) {
        let tag = event.tag();
        for (filter, listener) in &mut self.listeners {
            if filter.is_none() || *filter == Some(tag) {
                listener(world, event);
            }
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
