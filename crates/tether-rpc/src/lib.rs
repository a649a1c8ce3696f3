//! Remote procedure calls for Tether.
//!
//! An RPC is declared once, identically on both peers, in an
//! [`RpcRegistry`]: a name, the side it executes on, an ordered list of
//! typed argument interpreters, an optional return interpreter, and
//! whether the initiator expects a response. Invocations travel as
//! control records inside the replication packet body.
//!
//! The initiator queues calls through an [`RpcOutbox`] and gets a
//! [`PendingRpc`] back — the same consume-at-most-once completion contract
//! as the dispatcher's pending calls. The executor decodes, enforces the
//! direction restriction *before* the procedure body runs, and reports
//! decode or execution failures back to the initiator instead of silently
//! dropping the call. A failing procedure never takes the connection down.

mod call;
mod error;
mod registry;
mod value;

pub use call::{PendingRpc, RpcOutbox, execute_call};
pub use error::RpcError;
pub use registry::{RpcContext, RpcDescriptor, RpcHandler, RpcRegistry};
pub use value::{RpcType, RpcValue};

use std::fmt;

/// Identifies one registered procedure. Assigned by registration order,
/// which must match on both peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcId(pub u16);

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc-{}", self.0)
    }
}

/// Identifies one in-flight invocation, unique per initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}
