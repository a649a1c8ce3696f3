//! Snapshot writing and packet application.
//!
//! A packet body is a flat record stream:
//!
//! ```text
//! [structural records] [update records] [control records] END
//! ```
//!
//! Structural records go first so the receiver materializes placeholders
//! before their state arrives. Update records carry a `u16` payload length
//! so a receiver can step over records addressed to ids it no longer
//! knows. Control records (events, RPC traffic) are opaque here — the
//! connection driver routes their payloads to the event and RPC layers.

use tether_wire::{Opcode, SerialBuffer, Side, WireError};
use tracing::{debug, warn};

use crate::world::StructuralChange;
use crate::{NetworkId, Replicable, ReplicationError, TypeRegistry, TypeTag, World};

/// Largest update/control payload — bounded by the `u16` length prefix.
const MAX_RECORD_PAYLOAD: usize = u16::MAX as usize;

/// An opaque control record surfaced by [`apply_packet`] for the caller
/// to route to the event or RPC layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRecord {
    /// A replicated event payload.
    Event(Vec<u8>),
    /// An RPC invocation payload.
    RpcCall(Vec<u8>),
    /// An RPC response payload.
    RpcResponse(Vec<u8>),
}

fn overflow(e: WireError) -> ReplicationError {
    ReplicationError::SnapshotOverflow(e)
}

/// Appends one control record (`Event`, `RpcCall` or `RpcResponse`) to an
/// outgoing body.
pub fn write_control(
    buf: &mut SerialBuffer,
    opcode: Opcode,
    payload: &[u8],
) -> Result<(), ReplicationError> {
    debug_assert!(matches!(
        opcode,
        Opcode::Event | Opcode::RpcCall | Opcode::RpcResponse
    ));
    if payload.len() > MAX_RECORD_PAYLOAD {
        return Err(overflow(WireError::Malformed(format!(
            "control payload of {} bytes exceeds record limit",
            payload.len()
        ))));
    }
    opcode.write(buf).map_err(overflow)?;
    buf.put_u16(payload.len() as u16).map_err(overflow)?;
    buf.put_bytes(payload).map_err(overflow)?;
    Ok(())
}

/// Serializes everything that changed since the last snapshot into `buf`:
/// queued structural records first, then one update record per dirty
/// entity in depth-first tree order.
///
/// `local` selects the direction — a server writes server-authoritative
/// state, a client its client-authoritative state. Dirty bits are
/// consumed by this call: state not captured here is not captured later.
pub fn write_snapshot(
    world: &mut World,
    local: Side,
    buf: &mut SerialBuffer,
) -> Result<(), ReplicationError> {
    for change in world.take_pending() {
        match change {
            StructuralChange::ObjectAttach { id, parent, tag } => {
                Opcode::ObjectAttach.write(buf).map_err(overflow)?;
                buf.put_u64(id.into_inner()).map_err(overflow)?;
                buf.put_u64(parent.into_inner()).map_err(overflow)?;
                buf.put_u16(tag.0).map_err(overflow)?;
            }
            StructuralChange::ObjectDetach { id } => {
                Opcode::ObjectDetach.write(buf).map_err(overflow)?;
                buf.put_u64(id.into_inner()).map_err(overflow)?;
            }
            StructuralChange::ComponentAttach { owner, id, tag } => {
                Opcode::ComponentAttach.write(buf).map_err(overflow)?;
                buf.put_u64(owner.into_inner()).map_err(overflow)?;
                buf.put_u64(id.into_inner()).map_err(overflow)?;
                buf.put_u16(tag.0).map_err(overflow)?;
            }
            StructuralChange::ComponentDetach { id } => {
                Opcode::ComponentDetach.write(buf).map_err(overflow)?;
                buf.put_u64(id.into_inner()).map_err(overflow)?;
            }
        }
    }

    let mut scratch = SerialBuffer::with_capacity(MAX_RECORD_PAYLOAD);
    for id in world.depth_first_ids() {
        let component_ids: Vec<NetworkId> = world
            .components_of(id)
            .map(|c| c.to_vec())
            .unwrap_or_default();

        if let Some(entity) = world.object_mut(id) {
            if entity.needs_replication(local) {
                scratch.clear();
                entity.write_for(local, &mut scratch).map_err(overflow)?;
                write_update(buf, Opcode::ObjectUpdate, id, scratch.as_written())?;
            }
        }
        for component_id in component_ids {
            if let Some(entity) = world.component_mut(component_id) {
                if entity.needs_replication(local) {
                    scratch.clear();
                    entity.write_for(local, &mut scratch).map_err(overflow)?;
                    write_update(buf, Opcode::ComponentUpdate, component_id, scratch.as_written())?;
                }
            }
        }
    }
    Ok(())
}

fn write_update(
    buf: &mut SerialBuffer,
    opcode: Opcode,
    id: NetworkId,
    payload: &[u8],
) -> Result<(), ReplicationError> {
    opcode.write(buf).map_err(overflow)?;
    buf.put_u64(id.into_inner()).map_err(overflow)?;
    buf.put_u16(payload.len() as u16).map_err(overflow)?;
    buf.put_bytes(payload).map_err(overflow)?;
    Ok(())
}

/// Walks an incoming packet body and applies its records to `world`,
/// reading until [`Opcode::End`].
///
/// Records are applied in write order. Records addressed to unknown or
/// since-destroyed ids are skipped, as are individual entity payloads
/// that fail to decode — one bad entity cannot abort the rest of the
/// packet. A malformed record *stream* (unknown opcode, truncated body)
/// is fatal and surfaces as [`ReplicationError::Malformed`].
pub fn apply_packet(
    world: &mut World,
    local: Side,
    registry: &TypeRegistry,
    buf: &mut SerialBuffer,
    mut on_control: impl FnMut(ControlRecord),
) -> Result<(), ReplicationError> {
    let mut scratch = SerialBuffer::with_capacity(MAX_RECORD_PAYLOAD);
    loop {
        match Opcode::read(buf)? {
            Opcode::End => return Ok(()),
            Opcode::ObjectAttach => {
                let id = NetworkId(buf.get_u64()?);
                let parent = NetworkId(buf.get_u64()?);
                let tag = TypeTag(buf.get_u16()?);
                if let Err(e) = world.materialize_object(id, parent, tag, registry) {
                    warn!(%id, error = %e, "dropping object attach");
                }
            }
            Opcode::ObjectDetach => {
                let id = NetworkId(buf.get_u64()?);
                world.remove_remote_object(id);
            }
            Opcode::ComponentAttach => {
                let owner = NetworkId(buf.get_u64()?);
                let id = NetworkId(buf.get_u64()?);
                let tag = TypeTag(buf.get_u16()?);
                if let Err(e) = world.materialize_component(owner, id, tag, registry) {
                    warn!(%id, error = %e, "dropping component attach");
                }
            }
            Opcode::ComponentDetach => {
                let id = NetworkId(buf.get_u64()?);
                world.remove_remote_component(id);
            }
            Opcode::ObjectUpdate => {
                apply_update(world, local, buf, &mut scratch, /*object=*/ true)?;
            }
            Opcode::ComponentUpdate => {
                apply_update(world, local, buf, &mut scratch, /*object=*/ false)?;
            }
            Opcode::Event => {
                let len = usize::from(buf.get_u16()?);
                on_control(ControlRecord::Event(buf.get_bytes(len)?));
            }
            Opcode::RpcCall => {
                let len = usize::from(buf.get_u16()?);
                on_control(ControlRecord::RpcCall(buf.get_bytes(len)?));
            }
            Opcode::RpcResponse => {
                let len = usize::from(buf.get_u16()?);
                on_control(ControlRecord::RpcResponse(buf.get_bytes(len)?));
            }
        }
    }
}

fn apply_update(
    world: &mut World,
    local: Side,
    buf: &mut SerialBuffer,
    scratch: &mut SerialBuffer,
    object: bool,
) -> Result<(), ReplicationError> {
    let id = NetworkId(buf.get_u64()?);
    let len = usize::from(buf.get_u16()?);
    // Pull the payload out regardless of the target's fate: the stream
    // must stay in sync even when the record is dropped.
    let payload = buf.get_bytes(len)?;

    let entity = if object {
        world.object_mut(id)
    } else {
        world.component_mut(id)
    };
    let Some(entity) = entity else {
        debug!(%id, "update for unknown entity skipped");
        return Ok(());
    };

    scratch.load(&payload).map_err(ReplicationError::Malformed)?;
    if let Err(e) = entity.read_for(local, scratch) {
        debug!(%id, error = %e, "entity payload failed to decode, record skipped");
    }
    Ok(())
}
