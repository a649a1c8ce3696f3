//! Procedure declaration and lookup.

use std::collections::HashMap;

use tether_wire::Side;

use tether_replication::{NetworkId, World};

use crate::{RpcError, RpcId, RpcType, RpcValue};

/// The execution context handed to a procedure body: who is calling and
/// which entity acts on their behalf.
#[derive(Debug, Clone, Copy)]
pub struct RpcContext {
    /// The side the call came from.
    pub from: Side,
    /// The entity owned by the calling connection, or
    /// [`NetworkId::NONE`] when the connection owns none.
    pub actor: NetworkId,
}

/// A procedure body. Runs on the simulation loop against the live world.
pub type RpcHandler = Box<
    dyn Fn(&mut World, &RpcContext, Vec<RpcValue>) -> Result<Option<RpcValue>, RpcError>
        + Send
        + Sync,
>;

/// One registered procedure.
pub struct RpcDescriptor {
    /// Wire id, assigned by registration order.
    pub id: RpcId,
    /// Human-readable name, unique per registry.
    pub name: String,
    /// The only side allowed to execute this procedure.
    pub executes_on: Side,
    /// Ordered argument interpreters.
    pub args: Vec<RpcType>,
    /// Return-value interpreter, if the procedure returns anything.
    pub returns: Option<RpcType>,
    /// Whether the initiator expects an acknowledgement/return.
    pub wants_response: bool,
    pub(crate) handler: RpcHandler,
}

/// All procedures known to one peer.
///
/// Ids are assigned in registration order, so both peers must register
/// the same procedures in the same order — the registry is part of the
/// protocol, exactly like the entity type registry.
pub struct RpcRegistry {
    by_id: HashMap<RpcId, RpcDescriptor>,
    by_name: HashMap<String, RpcId>,
    next_id: u16,
}

impl RpcRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a procedure and returns its wire id.
    #[allow(clippy::too_many_arguments)]
    pub fn register<F>(
        &mut self,
        name: &str,
        executes_on: Side,
        args: Vec<RpcType>,
        returns: Option<RpcType>,
        wants_response: bool,
        handler: F,
    ) -> RpcId
    where
        F: Fn(&mut World, &RpcContext, Vec<RpcValue>) -> Result<Option<RpcValue>, RpcError>
            + Send
            + Sync
            + 'static,
    {
        let id = RpcId(self.next_id);
        self.next_id += 1;
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(
            id,
            RpcDescriptor {
                id,
                name: name.to_string(),
                executes_on,
                args,
                returns,
                wants_response,
                handler: Box::new(handler),
            },
        );
        id
    }

    /// Looks a procedure up by wire id.
    pub fn descriptor(&self, id: RpcId) -> Option<&RpcDescriptor> {
        self.by_id.get(&id)
    }

    /// Looks a procedure up by name.
    pub fn by_name(&self, name: &str) -> Option<&RpcDescriptor> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Number of registered procedures.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for RpcRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_assigns_ids() {
        let mut registry = RpcRegistry::new();
        let a = registry.register("first", Side::Server, vec![], None, false, |_, _, _| Ok(None));
        let b = registry.register("second", Side::Client, vec![], None, false, |_, _, _| Ok(None));
        assert_eq!(a, RpcId(1));
        assert_eq!(b, RpcId(2));
        assert_eq!(registry.by_name("second").unwrap().id, b);
        assert_eq!(registry.descriptor(a).unwrap().name, "first");
        assert_eq!(registry.len(), 2);
    }
}
