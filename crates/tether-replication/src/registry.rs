//! Constructor registry for placeholder materialization.

use std::collections::HashMap;

use crate::{Replicable, ReplicationError, Transform, TypeTag};

type Constructor = Box<dyn Fn() -> Box<dyn Replicable> + Send + Sync>;

/// Maps wire-level type tags to constructors.
///
/// When a structural attach record arrives, the receiver looks the tag up
/// here and materializes a placeholder instance; the per-field update
/// records then fill it in. Unregistered tags are a registration bug on
/// the receiving side, not a protocol violation — the attach is dropped
/// and logged, and later updates for that id fall into the unknown-id
/// skip path.
pub struct TypeRegistry {
    constructors: HashMap<TypeTag, Constructor>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with the built-in [`Transform`] registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Transform::TYPE_TAG, || Box::new(Transform::default()));
        registry
    }

    /// Registers a constructor for `tag`, replacing any previous one.
    pub fn register<F>(&mut self, tag: TypeTag, ctor: F)
    where
        F: Fn() -> Box<dyn Replicable> + Send + Sync + 'static,
    {
        self.constructors.insert(tag, Box::new(ctor));
    }

    /// Materializes a placeholder for `tag`.
    pub fn create(&self, tag: TypeTag) -> Result<Box<dyn Replicable>, ReplicationError> {
        self.constructors
            .get(&tag)
            .map(|ctor| ctor())
            .ok_or(ReplicationError::UnknownType(tag))
    }

    /// Whether `tag` has a constructor.
    pub fn contains(&self, tag: TypeTag) -> bool {
        self.constructors.contains_key(&tag)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
