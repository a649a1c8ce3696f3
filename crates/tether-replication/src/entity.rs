//! The [`Replicable`] capability and the base [`Transform`] entity.

use std::any::Any;

use tether_wire::{SerialBuffer, Side, WireError};

use crate::TypeTag;

/// One dirty bit per replication direction, consumed read-then-clear.
///
/// Marking records "this entity changed since the last snapshot was
/// written", keyed by the side doing the writing. [`take`](Self::take)
/// clears the bit — collect-since-last-send semantics. A peer that misses
/// a snapshot misses that delta; the drivers therefore write one snapshot
/// per tick and fan the identical body out to every link.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicationFlags {
    from_server: bool,
    from_client: bool,
}

impl ReplicationFlags {
    /// Marks the entity dirty for snapshots written by `writer`.
    pub fn mark(&mut self, writer: Side) {
        match writer {
            Side::Server => self.from_server = true,
            Side::Client => self.from_client = true,
        }
    }

    /// Marks both directions. Used on attach so the initial state
    /// follows the structural record.
    pub fn mark_all(&mut self) {
        self.from_server = true;
        self.from_client = true;
    }

    /// Reads and clears the bit for `writer`.
    pub fn take(&mut self, writer: Side) -> bool {
        match writer {
            Side::Server => std::mem::take(&mut self.from_server),
            Side::Client => std::mem::take(&mut self.from_client),
        }
    }

    /// Peeks without clearing.
    pub fn is_set(&self, writer: Side) -> bool {
        match writer {
            Side::Server => self.from_server,
            Side::Client => self.from_client,
        }
    }
}

/// Capability implemented by everything that participates in replication:
/// objects, components, global state.
///
/// Serialization is keyed by (direction, role): the server writes with
/// [`write_server`](Self::write_server) and the client reads that payload
/// with [`read_client`](Self::read_client); the reverse pair carries
/// client-authoritative state the other way. The default client→server
/// pair is empty — most state is server-authoritative.
pub trait Replicable: Send + 'static {
    /// Wire-level type tag; must be registered in the receiving side's
    /// [`TypeRegistry`](crate::TypeRegistry).
    fn type_tag(&self) -> TypeTag;

    /// The entity's dirty bits.
    fn flags(&mut self) -> &mut ReplicationFlags;

    /// Reads and clears the dirty bit for snapshots written by `writer`.
    fn needs_replication(&mut self, writer: Side) -> bool {
        self.flags().take(writer)
    }

    /// Serializes server-authoritative state.
    fn write_server(&self, buf: &mut SerialBuffer) -> Result<(), WireError>;

    /// Applies server-authoritative state on the client.
    fn read_client(&mut self, buf: &mut SerialBuffer) -> Result<(), WireError>;

    /// Serializes client-authoritative state (e.g. control inputs).
    fn write_client(&self, _buf: &mut SerialBuffer) -> Result<(), WireError> {
        Ok(())
    }

    /// Applies client-authoritative state on the server.
    fn read_server(&mut self, _buf: &mut SerialBuffer) -> Result<(), WireError> {
        Ok(())
    }

    /// Downcast support for the simulation seam.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Dispatches to the write method for the local side.
    fn write_for(&self, local: Side, buf: &mut SerialBuffer) -> Result<(), WireError> {
        match local {
            Side::Server => self.write_server(buf),
            Side::Client => self.write_client(buf),
        }
    }

    /// Dispatches to the read method for the local side.
    fn read_for(&mut self, local: Side, buf: &mut SerialBuffer) -> Result<(), WireError> {
        match local {
            Side::Server => self.read_server(buf),
            Side::Client => self.read_client(buf),
        }
    }
}

/// Base spatial entity: position always, rotation and scale only when
/// they differ from the defaults, each behind a presence bit.
///
/// Subclasses of the source's base object map onto types that embed a
/// `Transform` and append their own fields after
/// [`write_transform`](Self::write_transform).
#[derive(Debug, Clone)]
pub struct Transform {
    flags: ReplicationFlags,
    /// World position.
    pub position: [f32; 3],
    /// Orientation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    /// Per-axis scale.
    pub scale: [f32; 3],
}

/// Identity quaternion.
const ROTATION_DEFAULT: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
/// Unit scale.
const SCALE_DEFAULT: [f32; 3] = [1.0, 1.0, 1.0];

impl Default for Transform {
    fn default() -> Self {
        Self {
            flags: ReplicationFlags::default(),
            position: [0.0; 3],
            rotation: ROTATION_DEFAULT,
            scale: SCALE_DEFAULT,
        }
    }
}

impl Transform {
    /// Wire tag for the bare transform object.
    pub const TYPE_TAG: TypeTag = TypeTag(1);

    /// Creates a transform at `position`.
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Writes position + gated rotation/scale. Embedders call this first,
    /// then append their own fields.
    pub fn write_transform(&self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        for c in self.position {
            buf.put_f32(c)?;
        }
        let has_rotation = self.rotation != ROTATION_DEFAULT;
        buf.put_bool(has_rotation)?;
        if has_rotation {
            for c in self.rotation {
                buf.put_f32(c)?;
            }
        }
        let has_scale = self.scale != SCALE_DEFAULT;
        buf.put_bool(has_scale)?;
        if has_scale {
            for c in self.scale {
                buf.put_f32(c)?;
            }
        }
        Ok(())
    }

    /// Mirror of [`write_transform`](Self::write_transform). Absent fields
    /// reset to their defaults.
    pub fn read_transform(&mut self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        for c in &mut self.position {
            *c = buf.get_f32()?;
        }
        if buf.get_bool()? {
            for c in &mut self.rotation {
                *c = buf.get_f32()?;
            }
        } else {
            self.rotation = ROTATION_DEFAULT;
        }
        if buf.get_bool()? {
            for c in &mut self.scale {
                *c = buf.get_f32()?;
            }
        } else {
            self.scale = SCALE_DEFAULT;
        }
        Ok(())
    }
}

impl Replicable for Transform {
    fn type_tag(&self) -> TypeTag {
        Self::TYPE_TAG
    }

    fn flags(&mut self) -> &mut ReplicationFlags {
        &mut self.flags
    }

    fn write_server(&self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        self.write_transform(buf)
    }

    fn read_client(&mut self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        self.read_transform(buf)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// =========================================================================
// Tests
// =========================================================================
