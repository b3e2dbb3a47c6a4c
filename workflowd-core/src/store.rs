//! Instance store.

use crate::definition::canonical_id;
use crate::error::CoreError;
use crate::instance::WorkflowInstance;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to one instance. Holding its write lock serializes every
/// mutation of that instance.
pub(crate) type InstanceHandle = Arc<RwLock<WorkflowInstance>>;

/// Running instances, keyed by canonical id. Each instance sits behind its
/// own lock so transitions on different instances never contend.
#[derive(Default)]
pub struct InstanceStore {
    instances: DashMap<String, InstanceHandle>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `instance` unless its id is taken (case-insensitive).
    pub(crate) fn insert(&self, instance: WorkflowInstance) -> Result<(), CoreError> {
        match self.instances.entry(canonical_id(instance.id())) {
            Entry::Occupied(_) => Err(CoreError::DuplicateInstanceId {
                id: instance.id().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(instance)));
                Ok(())
            }
        }
    }

    /// Returns the lock handle for an instance.
    ///
    /// The map guard is released before returning, so callers may hold the
    /// instance lock for as long as they need.
    pub(crate) fn handle(&self, id: &str) -> Result<InstanceHandle, CoreError> {
        self.instances
            .get(&canonical_id(id))
            .map(|r| r.value().clone())
            .ok_or_else(|| CoreError::InstanceNotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(&canonical_id(id))
    }

    /// Returns a copy of an instance.
    pub fn get(&self, id: &str) -> Result<WorkflowInstance, CoreError> {
        let handle = self.handle(id)?;
        let instance = handle.read().clone();
        Ok(instance)
    }

    /// Returns copies of all instances, ordered by canonical id.
    pub fn list(&self) -> Vec<WorkflowInstance> {
        let mut handles: Vec<_> = self
            .instances
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
            .into_iter()
            .map(|(_, handle)| handle.read().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store = InstanceStore::new();
        store
            .insert(WorkflowInstance::new("Inst-1", "order", "Draft"))
            .unwrap();

        let instance = store.get("inst-1").unwrap();
        assert_eq!(instance.id(), "Inst-1");
        assert!(store.contains("INST-1"));
    }

    #[test]
    fn test_duplicate_insert_keeps_original() {
        let store = InstanceStore::new();
        store
            .insert(WorkflowInstance::new("i-1", "order", "Draft"))
            .unwrap();

        let result = store.insert(WorkflowInstance::new("I-1", "other", "Start"));
        assert_eq!(
            result.unwrap_err(),
            CoreError::DuplicateInstanceId { id: "I-1".into() }
        );
        assert_eq!(store.get("i-1").unwrap().definition_id(), "order");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_not_found() {
        let store = InstanceStore::new();
        assert!(matches!(
            store.get("missing"),
            Err(CoreError::InstanceNotFound { .. })
        ));
    }

    #[test]
    fn test_list_returns_copies() {
        let store = InstanceStore::new();
        store
            .insert(WorkflowInstance::new("b", "order", "Draft"))
            .unwrap();
        store
            .insert(WorkflowInstance::new("a", "order", "Draft"))
            .unwrap();

        let listed = store.list();
        let ids: Vec<_> = listed.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
