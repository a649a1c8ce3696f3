//! Error types for the RPC layer.

use tether_wire::Side;

use crate::RpcId;

/// Errors that can occur while declaring, invoking, or executing RPCs.
///
/// None of these are fatal to the connection: a failing call is isolated
/// and, when a response was requested, reported back to the initiator.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// No procedure registered under this name.
    #[error("unknown rpc \"{0}\"")]
    UnknownName(String),

    /// No procedure registered under this wire id.
    #[error("unknown {0}")]
    UnknownId(RpcId),

    /// The procedure executes on the other side of the connection than
    /// the one it was dispatched to.
    #[error("{rpc} executes on the {executes_on}, not on the {attempted}")]
    Direction {
        /// The procedure in question.
        rpc: RpcId,
        /// Where it is allowed to execute.
        executes_on: Side,
        /// Where execution was attempted.
        attempted: Side,
    },

    /// Arguments did not match the declared interpreter list.
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// A call or response payload failed to decode locally.
    #[error("malformed rpc payload: {0}")]
    Decode(#[from] tether_wire::WireError),

    /// The peer reported it could not decode our call.
    #[error("peer failed to decode the call")]
    RemoteDecode,

    /// The peer rejected the call before running it (direction or
    /// registration mismatch).
    #[error("peer rejected the call")]
    RemoteRejected,

    /// The procedure body failed on the peer.
    #[error("procedure failed on the peer")]
    RemoteExecution,

    /// The procedure body failed locally. Raised by handlers.
    #[error("procedure failed: {0}")]
    Execution(String),

    /// The connection went away before the response arrived.
    #[error("connection closed before the response arrived")]
    Cancelled,

    /// The response was already consumed once.
    #[error("response already taken")]
    AlreadyTaken,
}
