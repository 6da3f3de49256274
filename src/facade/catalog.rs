use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{OrmError, Result};
use crate::descriptor::EntityDescriptor;
use crate::mapping::{Entity, EntityId};

/// Catalog of registered entities.
///
/// Immutable once built: registering returns a NEW catalog sharing nothing
/// mutable with the old one, so a clone can be read without locks.
#[derive(Clone, Default)]
pub struct Catalog {
    /// Arena indexed by `EntityId`
    entities: Arc<Vec<Arc<Entity>>>,
    by_type: Arc<HashMap<String, EntityId>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity - returns the NEW catalog and the entity's id
    pub fn with_entity(self, descriptor: EntityDescriptor) -> Result<(Self, EntityId)> {
        if self.by_type.contains_key(&descriptor.type_name) {
            return Err(OrmError::configuration(
                &descriptor.type_name,
                "type is registered twice",
            ));
        }

        let id = EntityId(self.entities.len());
        let mut by_type = (*self.by_type).clone();
        by_type.insert(descriptor.type_name.clone(), id);

        let mut entities = (*self.entities).clone();
        entities.push(Arc::new(Entity::new(id, descriptor)));

        Ok((
            Self {
                entities: Arc::new(entities),
                by_type: Arc::new(by_type),
            },
            id,
        ))
    }

    pub fn get(&self, id: EntityId) -> Option<&Arc<Entity>> {
        self.entities.get(id.0)
    }

    pub fn lookup(&self, type_name: &str) -> Option<&Arc<Entity>> {
        self.by_type.get(type_name).and_then(|id| self.get(*id))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.by_type.contains_key(type_name)
    }

    pub fn entities(&self) -> &[Arc<Entity>] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_entity_leaves_old_catalog_untouched() {
        let empty = Catalog::new();
        let (one, id) = empty.clone().with_entity(EntityDescriptor::new("A")).unwrap();

        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(one.lookup("A").map(|entity| entity.id()), Some(id));
        assert!(one.get(id).is_some());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let (catalog, _) = Catalog::new().with_entity(EntityDescriptor::new("A")).unwrap();
        let err = catalog.with_entity(EntityDescriptor::new("A")).err().unwrap();
        assert!(err.is_configuration());
    }
}
