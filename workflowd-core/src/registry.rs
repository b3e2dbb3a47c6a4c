//! Definition registry.

use crate::definition::{canonical_id, DefinitionSpec, WorkflowDefinition};
use crate::error::CoreError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Resolves a caller-supplied id: trimmed, or a fresh UUID if blank.
pub(crate) fn resolve_id(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().simple().to_string(),
    }
}

/// Validated definitions, keyed by canonical id. Entries are never replaced
/// or removed.
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: DashMap<String, Arc<WorkflowDefinition>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `spec` and stores the resulting definition.
    pub fn create(&self, spec: DefinitionSpec) -> Result<Arc<WorkflowDefinition>, CoreError> {
        let id = resolve_id(spec.id.as_deref());
        let definition = Arc::new(WorkflowDefinition::from_parts(
            id,
            spec.name,
            spec.states,
            spec.actions,
        )?);

        match self.definitions.entry(canonical_id(definition.id())) {
            Entry::Occupied(_) => Err(CoreError::DuplicateDefinitionId {
                id: definition.id().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(definition.clone());
                tracing::debug!(
                    "Registered definition {} ({} states, {} actions)",
                    definition.id(),
                    definition.states().len(),
                    definition.actions().len()
                );
                Ok(definition)
            }
        }
    }

    /// Looks up a definition (case-insensitive).
    pub fn get(&self, id: &str) -> Result<Arc<WorkflowDefinition>, CoreError> {
        self.definitions
            .get(&canonical_id(id))
            .map(|r| r.clone())
            .ok_or_else(|| CoreError::DefinitionNotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(&canonical_id(id))
    }

    /// Returns all definitions, ordered by canonical id.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut entries: Vec<_> = self
            .definitions
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, def)| def).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
