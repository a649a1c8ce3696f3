//! The replicated entity tree.
//!
//! A [`World`] is owned by exactly one loop — the simulation loop — and is
//! never touched from another thread directly; network tasks marshal
//! access through the owning loop's dispatcher. All tree mutations funnel
//! through the attach/detach operations here, which also queue the
//! structural records the next snapshot will carry.

use std::collections::HashMap;

use tether_wire::Side;
use tracing::debug;

use crate::{IdAllocator, NetworkId, Replicable, ReplicationError, TypeRegistry, TypeTag};

/// A queued tree edit, written ahead of entity updates in the next
/// snapshot so receivers materialize placeholders before state arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StructuralChange {
    ObjectAttach {
        id: NetworkId,
        parent: NetworkId,
        tag: TypeTag,
    },
    ObjectDetach {
        id: NetworkId,
    },
    ComponentAttach {
        owner: NetworkId,
        id: NetworkId,
        tag: TypeTag,
    },
    ComponentDetach {
        id: NetworkId,
    },
}

struct ObjectEntry {
    entity: Box<dyn Replicable>,
    parent: NetworkId,
    children: Vec<NetworkId>,
    components: Vec<NetworkId>,
}

struct ComponentEntry {
    entity: Box<dyn Replicable>,
    owner: NetworkId,
}

/// The entity tree: objects with child objects and owned components.
pub struct World {
    objects: HashMap<NetworkId, ObjectEntry>,
    components: HashMap<NetworkId, ComponentEntry>,
    roots: Vec<NetworkId>,
    allocator: IdAllocator,
    pending: Vec<StructuralChange>,
}

impl World {
    /// An empty tree with a fresh id allocator.
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            components: HashMap::new(),
            roots: Vec::new(),
            allocator: IdAllocator::new(),
            pending: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Tree mutation (local authority)
    // -----------------------------------------------------------------------

    /// Attaches `entity` under `parent` ([`NetworkId::NONE`] for a root),
    /// assigns it a fresh id, and queues the structural record.
    ///
    /// The entity starts dirty in both directions so its initial state
    /// follows the attach in the same snapshot.
    pub fn attach_object(
        &mut self,
        parent: NetworkId,
        mut entity: Box<dyn Replicable>,
    ) -> Result<NetworkId, ReplicationError> {
        if !parent.is_none() && !self.objects.contains_key(&parent) {
            return Err(ReplicationError::UnknownParent(parent));
        }
        let id = self.allocator.allocate();
        let tag = entity.type_tag();
        entity.flags().mark_all();
        self.insert_object(id, parent, entity);
        self.pending
            .push(StructuralChange::ObjectAttach { id, parent, tag });
        Ok(id)
    }

    /// Detaches an object, its subtree, and all owned components, and
    /// queues the structural record. Receivers detach recursively too, so
    /// only the subtree root travels.
    pub fn detach_object(&mut self, id: NetworkId) -> Result<(), ReplicationError> {
        if !self.objects.contains_key(&id) {
            return Err(ReplicationError::UnknownEntity(id));
        }
        self.remove_object_tree(id);
        self.pending.push(StructuralChange::ObjectDetach { id });
        Ok(())
    }

    /// Attaches a component to `owner` and queues the structural record.
    pub fn attach_component(
        &mut self,
        owner: NetworkId,
        mut entity: Box<dyn Replicable>,
    ) -> Result<NetworkId, ReplicationError> {
        let Some(owner_entry) = self.objects.get_mut(&owner) else {
            return Err(ReplicationError::UnknownParent(owner));
        };
        let id = self.allocator.allocate();
        let tag = entity.type_tag();
        entity.flags().mark_all();
        owner_entry.components.push(id);
        self.components.insert(id, ComponentEntry { entity, owner });
        self.pending
            .push(StructuralChange::ComponentAttach { owner, id, tag });
        Ok(id)
    }

    /// Detaches one component and queues the structural record.
    pub fn detach_component(&mut self, id: NetworkId) -> Result<(), ReplicationError> {
        let entry = self
            .components
            .remove(&id)
            .ok_or(ReplicationError::UnknownEntity(id))?;
        if let Some(owner) = self.objects.get_mut(&entry.owner) {
            owner.components.retain(|c| *c != id);
        }
        self.pending.push(StructuralChange::ComponentDetach { id });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tree mutation (remote records — no structural echo)
    // -----------------------------------------------------------------------

    /// Materializes a placeholder announced by the peer. Re-announcing an
    /// existing id is ignored; an unknown parent demotes the object to a
    /// root rather than dropping state on the floor.
    pub(crate) fn materialize_object(
        &mut self,
        id: NetworkId,
        parent: NetworkId,
        tag: TypeTag,
        registry: &TypeRegistry,
    ) -> Result<(), ReplicationError> {
        if self.objects.contains_key(&id) {
            debug!(%id, "attach for known object ignored");
            return Ok(());
        }
        let entity = registry.create(tag)?;
        let parent = if !parent.is_none() && !self.objects.contains_key(&parent) {
            debug!(%id, %parent, "attach under unknown parent, placing at root");
            NetworkId::NONE
        } else {
            parent
        };
        self.allocator.reserve(id);
        self.insert_object(id, parent, entity);
        Ok(())
    }

    /// Applies a remote object detach. Unknown ids are a no-op — the
    /// local side may have detached first.
    pub(crate) fn remove_remote_object(&mut self, id: NetworkId) {
        if self.objects.contains_key(&id) {
            self.remove_object_tree(id);
        } else {
            debug!(%id, "detach for unknown object ignored");
        }
    }

    /// Materializes a component placeholder announced by the peer.
    pub(crate) fn materialize_component(
        &mut self,
        owner: NetworkId,
        id: NetworkId,
        tag: TypeTag,
        registry: &TypeRegistry,
    ) -> Result<(), ReplicationError> {
        if self.components.contains_key(&id) {
            debug!(%id, "attach for known component ignored");
            return Ok(());
        }
        let Some(owner_entry) = self.objects.get_mut(&owner) else {
            debug!(%id, %owner, "component attach for unknown owner ignored");
            return Ok(());
        };
        let entity = registry.create(tag)?;
        owner_entry.components.push(id);
        self.allocator.reserve(id);
        self.components.insert(id, ComponentEntry { entity, owner });
        Ok(())
    }

    /// Applies a remote component detach.
    pub(crate) fn remove_remote_component(&mut self, id: NetworkId) {
        let Some(entry) = self.components.remove(&id) else {
            debug!(%id, "detach for unknown component ignored");
            return;
        };
        if let Some(owner) = self.objects.get_mut(&entry.owner) {
            owner.components.retain(|c| *c != id);
        }
    }

    fn insert_object(&mut self, id: NetworkId, parent: NetworkId, entity: Box<dyn Replicable>) {
        self.objects.insert(
            id,
            ObjectEntry {
                entity,
                parent,
                children: Vec::new(),
                components: Vec::new(),
            },
        );
        if let Some(parent_entry) = self.objects.get_mut(&parent) {
            parent_entry.children.push(id);
        } else {
            // Callers resolve unknown parents to NONE before inserting.
            self.roots.push(id);
        }
    }

    /// Removes `id` with its whole subtree and components from the maps.
    fn remove_object_tree(&mut self, id: NetworkId) {
        let Some(entry) = self.objects.remove(&id) else {
            return;
        };
        if entry.parent.is_none() {
            self.roots.retain(|r| *r != id);
        } else if let Some(parent) = self.objects.get_mut(&entry.parent) {
            parent.children.retain(|c| *c != id);
        }
        for component in entry.components {
            self.components.remove(&component);
        }
        for child in entry.children {
            self.remove_object_tree(child);
        }
    }

    // -----------------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------------

    /// The object with `id`, if attached.
    pub fn object(&self, id: NetworkId) -> Option<&dyn Replicable> {
        self.objects.get(&id).map(|e| e.entity.as_ref())
    }

    /// Mutable access to the object with `id`.
    pub fn object_mut(&mut self, id: NetworkId) -> Option<&mut dyn Replicable> {
        self.objects.get_mut(&id).map(|e| e.entity.as_mut())
    }

    /// The object with `id`, downcast to its concrete type.
    pub fn object_as<T: Replicable>(&self, id: NetworkId) -> Option<&T> {
        self.object(id)?.as_any().downcast_ref()
    }

    /// Mutable downcast access to the object with `id`.
    pub fn object_as_mut<T: Replicable>(&mut self, id: NetworkId) -> Option<&mut T> {
        self.object_mut(id)?.as_any_mut().downcast_mut()
    }

    /// The component with `id`, if attached.
    pub fn component(&self, id: NetworkId) -> Option<&dyn Replicable> {
        self.components.get(&id).map(|e| e.entity.as_ref())
    }

    /// Mutable access to the component with `id`.
    pub fn component_mut(&mut self, id: NetworkId) -> Option<&mut dyn Replicable> {
        self.components.get_mut(&id).map(|e| e.entity.as_mut())
    }

    /// The component with `id`, downcast to its concrete type.
    pub fn component_as<T: Replicable>(&self, id: NetworkId) -> Option<&T> {
        self.component(id)?.as_any().downcast_ref()
    }

    /// Mutable downcast access to the component with `id`.
    pub fn component_as_mut<T: Replicable>(&mut self, id: NetworkId) -> Option<&mut T> {
        self.component_mut(id)?.as_any_mut().downcast_mut()
    }

    /// Marks an object or component dirty for snapshots written by
    /// `writer`. Returns whether the id was known.
    pub fn mark_dirty(&mut self, id: NetworkId, writer: Side) -> bool {
        if let Some(entry) = self.objects.get_mut(&id) {
            entry.entity.flags().mark(writer);
            true
        } else if let Some(entry) = self.components.get_mut(&id) {
            entry.entity.flags().mark(writer);
            true
        } else {
            false
        }
    }

    /// Root object ids in attach order.
    pub fn roots(&self) -> &[NetworkId] {
        &self.roots
    }

    /// The parent of `id`, or [`NetworkId::NONE`] for roots.
    pub fn parent_of(&self, id: NetworkId) -> Option<NetworkId> {
        self.objects.get(&id).map(|e| e.parent)
    }

    /// Child object ids of `id` in attach order.
    pub fn children_of(&self, id: NetworkId) -> Option<&[NetworkId]> {
        self.objects.get(&id).map(|e| e.children.as_slice())
    }

    /// Component ids owned by `id` in attach order.
    pub fn components_of(&self, id: NetworkId) -> Option<&[NetworkId]> {
        self.objects.get(&id).map(|e| e.components.as_slice())
    }

    /// Number of attached objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of attached components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Whether `id` names an attached object.
    pub fn contains_object(&self, id: NetworkId) -> bool {
        self.objects.contains_key(&id)
    }

    /// All object ids, depth-first from the roots — the snapshot walk
    /// order.
    pub fn depth_first_ids(&self) -> Vec<NetworkId> {
        let mut out = Vec::with_capacity(self.objects.len());
        let mut stack: Vec<NetworkId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.objects.get(&id) {
                out.push(id);
                stack.extend(entry.children.iter().rev());
            }
        }
        out
    }

    /// Drains the queued structural changes in the order they happened.
    pub(crate) fn take_pending(&mut self) -> Vec<StructuralChange> {
        std::mem::take(&mut self.pending)
    }

    /// Whether structural changes are waiting for the next snapshot.
    pub fn has_pending_structure(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transform;

    fn transform() -> Box<dyn Replicable> {
        Box::new(Transform::default())
    }

    #[test]
    fn test_attach_assigns_fresh_ids_and_queues_records() {
        let mut world = World::new();
        let a = world.attach_object(NetworkId::NONE, transform()).unwrap();
        let b = world.attach_object(a, transform()).unwrap();

        assert_ne!(a, b);
        assert_eq!(world.roots(), &[a]);
        assert_eq!(world.children_of(a).unwrap(), &[b]);
        assert_eq!(world.parent_of(b), Some(a));
        assert!(world.has_pending_structure());
        assert_eq!(
            world.take_pending(),
            vec![
                StructuralChange::ObjectAttach {
                    id: a,
                    parent: NetworkId::NONE,
                    tag: Transform::TYPE_TAG
                },
                StructuralChange::ObjectAttach {
                    id: b,
                    parent: a,
                    tag: Transform::TYPE_TAG
                },
            ]
        );
    }

    #[test]
    fn test_attach_under_unknown_parent_fails() {
        let mut world = World::new();
        assert!(matches!(
            world.attach_object(NetworkId(99), transform()),
            Err(ReplicationError::UnknownParent(NetworkId(99)))
        ));
    }

    #[test]
    fn test_detach_removes_subtree_and_components() {
        let mut world = World::new();
        let root = world.attach_object(NetworkId::NONE, transform()).unwrap();
        let child = world.attach_object(root, transform()).unwrap();
        let comp = world.attach_component(child, transform()).unwrap();
        world.take_pending();

        world.detach_object(root).unwrap();
        assert_eq!(world.object_count(), 0);
        assert_eq!(world.component_count(), 0);
        assert!(!world.contains_object(child));
        assert!(world.component(comp).is_none());
        // Only the subtree root travels.
        assert_eq!(
            world.take_pending(),
            vec![StructuralChange::ObjectDetach { id: root }]
        );
    }

    #[test]
    fn test_component_lifecycle() {
        let mut world = World::new();
        let obj = world.attach_object(NetworkId::NONE, transform()).unwrap();
        let comp = world.attach_component(obj, transform()).unwrap();
        assert_eq!(world.components_of(obj).unwrap(), &[comp]);

        world.detach_component(comp).unwrap();
        assert!(world.components_of(obj).unwrap().is_empty());
        assert!(matches!(
            world.detach_component(comp),
            Err(ReplicationError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_depth_first_order() {
        let mut world = World::new();
        let r1 = world.attach_object(NetworkId::NONE, transform()).unwrap();
        let r2 = world.attach_object(NetworkId::NONE, transform()).unwrap();
        let c1 = world.attach_object(r1, transform()).unwrap();
        let c2 = world.attach_object(r1, transform()).unwrap();
        let g1 = world.attach_object(c1, transform()).unwrap();

        assert_eq!(world.depth_first_ids(), vec![r1, c1, g1, c2, r2]);
    }

    #[test]
    fn test_downcast_access() {
        let mut world = World::new();
        let id = world
            .attach_object(NetworkId::NONE, Box::new(Transform::at([1.0, 2.0, 3.0])))
            .unwrap();
        assert_eq!(world.object_as::<Transform>(id).unwrap().position[1], 2.0);
        world.object_as_mut::<Transform>(id).unwrap().position[1] = 5.0;
        assert_eq!(world.object_as::<Transform>(id).unwrap().position[1], 5.0);
    }

    #[test]
    fn test_materialize_is_idempotent_and_reserves_ids() {
        let mut world = World::new();
        let registry = TypeRegistry::with_defaults();
        world
            .materialize_object(
                NetworkId(7),
                NetworkId::NONE,
                Transform::TYPE_TAG,
                &registry,
            )
            .unwrap();
        world
            .materialize_object(
                NetworkId(7),
                NetworkId::NONE,
                Transform::TYPE_TAG,
                &registry,
            )
            .unwrap();
        assert_eq!(world.object_count(), 1);

        // Local allocation must not collide with the peer's id.
        let local = world.attach_object(NetworkId::NONE, transform()).unwrap();
        assert_eq!(local, NetworkId(8));
    }

    #[test]
    fn test_materialize_under_unknown_parent_lands_at_root() {
        let mut world = World::new();
        let registry = TypeRegistry::with_defaults();
        world
            .materialize_object(NetworkId(3), NetworkId(77), Transform::TYPE_TAG, &registry)
            .unwrap();
        assert_eq!(world.roots(), &[NetworkId(3)]);
    }

    #[test]
    fn test_remote_detach_of_unknown_id_is_silent() {
        let mut world = World::new();
        world.remove_remote_object(NetworkId(42));
        world.remove_remote_component(NetworkId(43));
        assert_eq!(world.object_count(), 0);
    }

    #[test]
    fn test_mark_dirty_sets_flag() {
        let mut world = World::new();
        let id = world.attach_object(NetworkId::NONE, transform()).unwrap();
        // Attach pre-marks; consume both bits first.
        world.object_mut(id).unwrap().needs_replication(Side::Server);
        world.object_mut(id).unwrap().needs_replication(Side::Client);

        assert!(world.mark_dirty(id, Side::Server));
        assert!(world.object_mut(id).unwrap().needs_replication(Side::Server));
        assert!(!world.object_mut(id).unwrap().needs_replication(Side::Server));
        assert!(!world.mark_dirty(NetworkId(99), Side::Server));
    }
}
