//! Unified error type for the Tether facade.

use tether_dispatch::DispatchError;
use tether_event::EventError;
use tether_replication::ReplicationError;
use tether_rpc::RpcError;
use tether_transport::TransportError;
use tether_wire::WireError;

/// Top-level error that wraps all layer-specific errors.
///
/// Applications using the `tether` meta-crate deal with this single type;
/// the `#[from]` impls let `?` lift layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// A transport-level error (connect, framing, deadline).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A wire-level serialization error.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A replication-level error (snapshot, apply, tree).
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// An RPC-level error.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// An event-level error.
    #[error(transparent)]
    Event(#[from] EventError),

    /// A cross-loop dispatch error.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Reading a configuration file failed.
    #[error("config read failed: {0}")]
    ConfigRead(#[source] std::io::Error),

    /// Parsing a configuration file failed.
    #[error("config parse failed: {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// A background task died.
    #[error("task failed: {0}")]
    Task(String),
}
