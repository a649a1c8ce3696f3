//! Integration tests for snapshot/apply between two worlds.
//!
//! These drive the replication protocol without a socket: the server
//! world writes a body into a `SerialBuffer`, the END sentinel is
//! appended the way the transport would, and the client world applies it.

use std::any::Any;

use tether_replication::{
    ControlRecord, NetworkId, Replicable, ReplicationError, ReplicationFlags, Transform,
    TypeRegistry, TypeTag, World, apply_packet, write_control, write_snapshot,
};
use tether_wire::{Opcode, SerialBuffer, Side, WireError};

/// A client-authoritative entity: its position is written by the client
/// and read by the server — the inverse trust of [`Transform`].
#[derive(Debug, Default)]
struct Probe {
    flags: ReplicationFlags,
    position: [f32; 3],
}

impl Probe {
    const TYPE_TAG: TypeTag = TypeTag(42);
}

impl Replicable for Probe {
    fn type_tag(&self) -> TypeTag {
        Self::TYPE_TAG
    }

    fn flags(&mut self) -> &mut ReplicationFlags {
        &mut self.flags
    }

    fn write_server(&self, _buf: &mut SerialBuffer) -> Result<(), WireError> {
        Ok(())
    }

    fn read_client(&mut self, _buf: &mut SerialBuffer) -> Result<(), WireError> {
        Ok(())
    }

    fn write_client(&self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        for c in self.position {
            buf.put_f32(c)?;
        }
        Ok(())
    }

    fn read_server(&mut self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        for c in &mut self.position {
            *c = buf.get_f32()?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_defaults();
    registry.register(Probe::TYPE_TAG, || Box::new(Probe::default()));
    registry
}

/// Snapshots `from` and applies the body to `to`, returning surfaced
/// control records.
fn replicate(from: &mut World, writer: Side, to: &mut World) -> Vec<ControlRecord> {
    let mut buf = SerialBuffer::with_capacity(65_536);
    write_snapshot(from, writer, &mut buf).expect("snapshot");
    Opcode::End.write(&mut buf).expect("end sentinel");
    buf.flip();

    let mut controls = Vec::new();
    apply_packet(to, writer.opposite(), &registry(), &mut buf, |c| {
        controls.push(c)
    })
    .expect("apply");
    controls
}

#[test]
fn test_attach_and_update_replicate_server_to_client() {
    let mut server = World::new();
    let mut client = World::new();

    let id = server
        .attach_object(NetworkId::NONE, Box::new(Transform::at([1.0, 2.0, 0.0])))
        .unwrap();
    replicate(&mut server, Side::Server, &mut client);

    let replica = client.object_as::<Transform>(id).expect("materialized");
    assert_eq!(replica.position, [1.0, 2.0, 0.0]);

    // Move it; only the dirty entity travels in the next cycle.
    server.object_as_mut::<Transform>(id).unwrap().position = [9.0, 9.0, 9.0];
    server.mark_dirty(id, Side::Server);
    replicate(&mut server, Side::Server, &mut client);
    assert_eq!(
        client.object_as::<Transform>(id).unwrap().position,
        [9.0, 9.0, 9.0]
    );
}

#[test]
fn test_client_originated_attach_and_update() {
    // The packet bytes a client would produce for "attach probe id=7,
    // then report position (1, 2, 0)", crafted record by record.
    let mut body = SerialBuffer::with_capacity(1024);
    Opcode::ObjectAttach.write(&mut body).unwrap();
    body.put_u64(7).unwrap();
    body.put_u64(0).unwrap(); // root
    body.put_u16(Probe::TYPE_TAG.0).unwrap();

    Opcode::ObjectUpdate.write(&mut body).unwrap();
    body.put_u64(7).unwrap();
    body.put_u16(12).unwrap();
    for c in [1.0f32, 2.0, 0.0] {
        body.put_f32(c).unwrap();
    }
    Opcode::End.write(&mut body).unwrap();
    body.flip();

    let mut server = World::new();
    apply_packet(&mut server, Side::Server, &registry(), &mut body, |_| {}).unwrap();

    let probe = server.object_as::<Probe>(NetworkId(7)).expect("materialized");
    assert_eq!(probe.position, [1.0, 2.0, 0.0]);
}

#[test]
fn test_no_dirty_entities_means_empty_snapshot() {
    let mut server = World::new();
    let mut client = World::new();

    let id = server
        .attach_object(NetworkId::NONE, Box::new(Transform::default()))
        .unwrap();
    server.attach_component(id, Box::new(Transform::default())).unwrap();
    replicate(&mut server, Side::Server, &mut client);

    // Nothing marked dirty since: the next body carries no records at all.
    let mut buf = SerialBuffer::with_capacity(65_536);
    write_snapshot(&mut server, Side::Server, &mut buf).unwrap();
    assert_eq!(buf.limit(), 0);
}

#[test]
fn test_detach_replicates_subtree() {
    let mut server = World::new();
    let mut client = World::new();

    let root = server
        .attach_object(NetworkId::NONE, Box::new(Transform::default()))
        .unwrap();
    let child = server.attach_object(root, Box::new(Transform::default())).unwrap();
    let comp = server
        .attach_component(child, Box::new(Transform::default()))
        .unwrap();
    replicate(&mut server, Side::Server, &mut client);
    assert_eq!(client.object_count(), 2);
    assert_eq!(client.component_count(), 1);

    server.detach_object(root).unwrap();
    replicate(&mut server, Side::Server, &mut client);
    assert_eq!(client.object_count(), 0);
    assert_eq!(client.component_count(), 0);
    assert!(client.object(child).is_none());
    assert!(client.component(comp).is_none());
}

#[test]
fn test_component_state_replicates() {
    let mut server = World::new();
    let mut client = World::new();

    let obj = server
        .attach_object(NetworkId::NONE, Box::new(Transform::default()))
        .unwrap();
    let comp = server
        .attach_component(obj, Box::new(Transform::at([0.5, 0.0, -0.5])))
        .unwrap();
    replicate(&mut server, Side::Server, &mut client);

    assert_eq!(
        client.component_as::<Transform>(comp).unwrap().position,
        [0.5, 0.0, -0.5]
    );
}

#[test]
fn test_update_for_destroyed_entity_is_skipped() {
    // Body: update for an id the receiver never saw, then a valid attach.
    // The stream must stay in sync past the skipped record.
    let mut body = SerialBuffer::with_capacity(1024);
    Opcode::ObjectUpdate.write(&mut body).unwrap();
    body.put_u64(999).unwrap();
    body.put_u16(12).unwrap();
    for c in [1.0f32, 2.0, 3.0] {
        body.put_f32(c).unwrap();
    }
    Opcode::ObjectAttach.write(&mut body).unwrap();
    body.put_u64(5).unwrap();
    body.put_u64(0).unwrap();
    body.put_u16(Transform::TYPE_TAG.0).unwrap();
    Opcode::End.write(&mut body).unwrap();
    body.flip();

    let mut client = World::new();
    apply_packet(&mut client, Side::Client, &registry(), &mut body, |_| {}).unwrap();
    assert!(client.contains_object(NetworkId(5)));
    assert!(!client.contains_object(NetworkId(999)));
}

#[test]
fn test_malformed_entity_payload_skips_record_only() {
    // A truncated transform payload (2 bytes) fails the entity read but
    // not the packet: the following attach still applies.
    let mut client = World::new();
    let registry = registry();

    let mut seed = SerialBuffer::with_capacity(256);
    Opcode::ObjectAttach.write(&mut seed).unwrap();
    seed.put_u64(1).unwrap();
    seed.put_u64(0).unwrap();
    seed.put_u16(Transform::TYPE_TAG.0).unwrap();
    Opcode::End.write(&mut seed).unwrap();
    seed.flip();
    apply_packet(&mut client, Side::Client, &registry, &mut seed, |_| {}).unwrap();

    let mut body = SerialBuffer::with_capacity(256);
    Opcode::ObjectUpdate.write(&mut body).unwrap();
    body.put_u64(1).unwrap();
    body.put_u16(2).unwrap();
    body.put_u16(0xFFFF).unwrap();
    Opcode::ObjectAttach.write(&mut body).unwrap();
    body.put_u64(2).unwrap();
    body.put_u64(0).unwrap();
    body.put_u16(Transform::TYPE_TAG.0).unwrap();
    Opcode::End.write(&mut body).unwrap();
    body.flip();

    apply_packet(&mut client, Side::Client, &registry, &mut body, |_| {}).unwrap();
    assert!(client.contains_object(NetworkId(2)));
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let mut body = SerialBuffer::with_capacity(16);
    body.put_u8(0x7F).unwrap();
    body.flip();

    let mut world = World::new();
    let err = apply_packet(&mut world, Side::Client, &registry(), &mut body, |_| {})
        .expect_err("must fail");
    assert!(matches!(err, ReplicationError::Malformed(_)));
}

#[test]
fn test_truncated_body_is_fatal() {
    // Update record announcing more payload than the body holds.
    let mut body = SerialBuffer::with_capacity(64);
    Opcode::ObjectUpdate.write(&mut body).unwrap();
    body.put_u64(1).unwrap();
    body.put_u16(500).unwrap();
    body.put_u32(0).unwrap();
    body.flip();

    let mut world = World::new();
    let err = apply_packet(&mut world, Side::Client, &registry(), &mut body, |_| {})
        .expect_err("must fail");
    assert!(matches!(err, ReplicationError::Malformed(_)));
}

#[test]
fn test_control_records_surface_in_order() {
    let mut body = SerialBuffer::with_capacity(256);
    write_control(&mut body, Opcode::Event, b"evt").unwrap();
    write_control(&mut body, Opcode::RpcCall, b"call").unwrap();
    write_control(&mut body, Opcode::RpcResponse, b"resp").unwrap();
    Opcode::End.write(&mut body).unwrap();
    body.flip();

    let mut world = World::new();
    let mut seen = Vec::new();
    apply_packet(&mut world, Side::Client, &registry(), &mut body, |c| {
        seen.push(c)
    })
    .unwrap();
    assert_eq!(
        seen,
        vec![
            ControlRecord::Event(b"evt".to_vec()),
            ControlRecord::RpcCall(b"call".to_vec()),
            ControlRecord::RpcResponse(b"resp".to_vec()),
        ]
    );
}
