//! Error types for the replication layer.

use crate::{NetworkId, TypeTag};

/// Errors that can occur while building or applying snapshots.
///
/// [`Malformed`](ReplicationError::Malformed) is fatal to the connection —
/// the record stream itself cannot be trusted any more. Everything else is
/// a local, per-operation failure.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// The packet body violates the record format (unknown opcode, read
    /// past the body end). The peer is untrusted from here on.
    #[error("malformed packet body: {0}")]
    Malformed(#[from] tether_wire::WireError),

    /// A snapshot did not fit into the outgoing buffer.
    #[error("snapshot exceeds outgoing buffer: {0}")]
    SnapshotOverflow(#[source] tether_wire::WireError),

    /// Operation addressed an entity this world does not know.
    #[error("unknown entity {0}")]
    UnknownEntity(NetworkId),

    /// Attach named a parent this world does not know.
    #[error("unknown parent {0}")]
    UnknownParent(NetworkId),

    /// No constructor registered for a type tag.
    #[error("no constructor registered for {0}")]
    UnknownType(TypeTag),
}
