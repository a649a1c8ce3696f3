//! Event dispatch for Tether.
//!
//! Events are causally ordered, cancellable notifications. Raising one
//! always resolves it locally first — handler execution stays on the
//! simulation loop — and only afterwards, if the event was neither
//! cancelled nor marked local-only, is it queued for the wire. On the
//! receiving side the event is decoded through the [`EventRegistry`] and
//! dispatched locally again, with [`EventMeta::from`] now naming the
//! remote origin.
//!
//! The marshalling onto the simulation loop is the facade's job (through
//! its dispatcher); this crate owns the event capability, the listener
//! bus, and the wire codec.

mod bus;
mod error;
mod event;
mod registry;

pub use bus::{EventBus, Listener};
pub use error::EventError;
pub use event::{Event, EventMeta, EventTag};
pub use registry::{EventRegistry, decode_event, encode_event};
