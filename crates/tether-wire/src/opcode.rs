//! Record opcodes and peer roles.

use std::fmt;

use crate::{SerialBuffer, WireError};

/// Which role a process plays on a connection.
///
/// Replication, RPC, and events are all directional: what a server may
/// write, a client may only read, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The connecting peer. Owns its inputs, trusts the server for state.
    Client,
    /// The authoritative peer.
    Server,
}

impl Side {
    /// The other end of the connection.
    pub fn opposite(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Server => write!(f, "server"),
        }
    }
}

/// Tag byte that opens every record in a packet body.
///
/// A body is a sequence of opcode-tagged records terminated by
/// [`Opcode::End`]. The numeric values are the wire format; they must
/// never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Body terminator. Appended by the transport on send.
    End = 0,
    /// A new object materialized in the tree.
    ObjectAttach = 1,
    /// An object (and its subtree) left the tree.
    ObjectDetach = 2,
    /// Per-field state for one object.
    ObjectUpdate = 3,
    /// A new component on an existing object.
    ComponentAttach = 4,
    /// A component left its object.
    ComponentDetach = 5,
    /// Per-field state for one component.
    ComponentUpdate = 6,
    /// A replicated event.
    Event = 7,
    /// A remote procedure invocation.
    RpcCall = 8,
    /// The response to an earlier [`Opcode::RpcCall`].
    RpcResponse = 9,
}

impl Opcode {
    /// Writes the opcode tag into `buf`.
    pub fn write(self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        buf.put_u8(self as u8)
    }

    /// Reads the next opcode tag from `buf`.
    pub fn read(buf: &mut SerialBuffer) -> Result<Opcode, WireError> {
        Opcode::try_from(buf.get_u8()?)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::End),
            1 => Ok(Opcode::ObjectAttach),
            2 => Ok(Opcode::ObjectDetach),
            3 => Ok(Opcode::ObjectUpdate),
            4 => Ok(Opcode::ComponentAttach),
            5 => Ok(Opcode::ComponentDetach),
            6 => Ok(Opcode::ComponentUpdate),
            7 => Ok(Opcode::Event),
            8 => Ok(Opcode::RpcCall),
            9 => Ok(Opcode::RpcResponse),
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_wire_values_are_stable() {
        // These values ARE the protocol. A renumbering here breaks every
        // deployed peer.
        assert_eq!(Opcode::End as u8, 0);
        assert_eq!(Opcode::ObjectAttach as u8, 1);
        assert_eq!(Opcode::ObjectDetach as u8, 2);
        assert_eq!(Opcode::ObjectUpdate as u8, 3);
        assert_eq!(Opcode::ComponentAttach as u8, 4);
        assert_eq!(Opcode::ComponentDetach as u8, 5);
        assert_eq!(Opcode::ComponentUpdate as u8, 6);
        assert_eq!(Opcode::Event as u8, 7);
        assert_eq!(Opcode::RpcCall as u8, 8);
        assert_eq!(Opcode::RpcResponse as u8, 9);
    }

    #[test]
    fn test_opcode_round_trip_through_buffer() {
        let mut buf = SerialBuffer::with_capacity(16);
        Opcode::RpcCall.write(&mut buf).unwrap();
        Opcode::End.write(&mut buf).unwrap();
        buf.flip();
        assert_eq!(Opcode::read(&mut buf).unwrap(), Opcode::RpcCall);
        assert_eq!(Opcode::read(&mut buf).unwrap(), Opcode::End);
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        assert!(matches!(
            Opcode::try_from(0x7F),
            Err(WireError::UnknownOpcode(0x7F))
        ));
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Client.opposite(), Side::Server);
        assert_eq!(Side::Server.opposite(), Side::Client);
    }
}
