//! State replication for Tether.
//!
//! The authoritative side owns a [`World`]: a tree of objects, each
//! optionally carrying components, all implementing the [`Replicable`]
//! capability. Once per tick the owning loop serializes everything that
//! changed into a packet body ([`write_snapshot`]) and the receiving side
//! routes those records back onto its own tree ([`apply_packet`]).
//!
//! Structural changes (attach/detach) travel as dedicated records written
//! ahead of the per-field updates, so a receiver always materializes a
//! placeholder before state for it arrives. Placeholders are constructed
//! through the [`TypeRegistry`] — a map from wire-level type tags to
//! constructors, so no open-ended reflection is involved.
//!
//! Replication is directional. An entity implements independent logic for
//! server→client and client→server because authority differs by
//! direction: a client's position is trusted from the server, a client's
//! control inputs are trusted from the client.

mod entity;
mod error;
mod id;
mod registry;
mod snapshot;
mod world;

pub use entity::{ReplicationFlags, Replicable, Transform};
pub use error::ReplicationError;
pub use id::{IdAllocator, NetworkId, TypeTag};
pub use registry::TypeRegistry;
pub use snapshot::{ControlRecord, apply_packet, write_control, write_snapshot};
pub use world::World;
