//! Workflow engine - coordinates definitions, instances and transitions.

use crate::definition::{canonical_id, DefinitionSpec, WorkflowDefinition};
use crate::error::CoreError;
use crate::instance::{HistoryEntry, WorkflowInstance};
use crate::registry::{resolve_id, DefinitionRegistry};
use crate::store::InstanceStore;
use std::sync::Arc;

/// Result of executing an action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The instance as it stood right after the transition.
    pub instance: WorkflowInstance,
    /// The history entry that was appended.
    pub entry: HistoryEntry,
    /// Whether the new current state is final.
    pub is_final: bool,
}

/// An instance together with what its definition says about its current state.
#[derive(Debug, Clone)]
pub struct InstanceView {
    pub instance: WorkflowInstance,
    pub is_final: bool,
    /// Ids of the actions that could fire from the current state.
    pub available_actions: Vec<String>,
}

/// The workflow engine.
///
/// Created once at startup and shared by `Arc` with every layer that needs
/// it. All operations are synchronous and in-memory.
#[derive(Default)]
pub struct WorkflowEngine {
    definitions: DefinitionRegistry,
    instances: InstanceStore,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Validates and registers a definition.
    pub fn create_definition(
        &self,
        spec: DefinitionSpec,
    ) -> Result<Arc<WorkflowDefinition>, CoreError> {
        self.definitions.create(spec)
    }

    /// Gets a definition (case-insensitive).
    pub fn get_definition(&self, id: &str) -> Result<Arc<WorkflowDefinition>, CoreError> {
        self.definitions.get(id)
    }

    /// Lists all definitions, ordered by id.
    pub fn list_definitions(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.definitions.list()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Starts a new instance of `definition_id` at its initial state.
    pub fn start_instance(
        &self,
        definition_id: &str,
        instance_id: Option<&str>,
    ) -> Result<WorkflowInstance, CoreError> {
        let definition = self.definitions.get(definition_id)?;
        let id = resolve_id(instance_id);

        let instance =
            WorkflowInstance::new(id, definition.id(), definition.initial_state_id());
        self.instances.insert(instance.clone())?;

        tracing::debug!(
            "Started instance {} of {} at {}",
            instance.id(),
            definition.id(),
            instance.current_state_id()
        );

        Ok(instance)
    }

    /// Gets a copy of an instance (case-insensitive).
    pub fn get_instance(&self, id: &str) -> Result<WorkflowInstance, CoreError> {
        self.instances.get(id)
    }

    /// Lists all instances, ordered by id.
    pub fn list_instances(&self) -> Vec<WorkflowInstance> {
        self.instances.list()
    }

    /// Lists the instances bound to `definition_id` (case-insensitive).
    pub fn list_instances_of(&self, definition_id: &str) -> Vec<WorkflowInstance> {
        let key = canonical_id(definition_id);
        self.instances
            .list()
            .into_iter()
            .filter(|i| canonical_id(i.definition_id()) == key)
            .collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Gets an instance along with its finality and available actions.
    pub fn describe_instance(&self, id: &str) -> Result<InstanceView, CoreError> {
        let instance = self.instances.get(id)?;
        Ok(self.view(instance))
    }

    /// Wraps an instance copy with what its definition says about it.
    ///
    /// An instance whose definition or current state cannot be resolved is
    /// reported as not final with no available actions.
    pub fn view(&self, instance: WorkflowInstance) -> InstanceView {
        let (is_final, available_actions) = match self.definitions.get(instance.definition_id())
        {
            Ok(def) => (
                def.is_final_state(instance.current_state_id()),
                def.available_actions(instance.current_state_id())
                    .into_iter()
                    .map(|a| a.id.clone())
                    .collect(),
            ),
            Err(_) => (false, Vec::new()),
        };

        InstanceView {
            instance,
            is_final,
            available_actions,
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Executes `action_id` against an instance.
    ///
    /// The instance's write lock is held from the first check through the
    /// history append, so executions against one instance are serialized.
    /// On any error the instance is left untouched.
    pub fn execute_action(
        &self,
        instance_id: &str,
        action_id: &str,
    ) -> Result<ActionOutcome, CoreError> {
        let handle = self.instances.handle(instance_id)?;
        let mut instance = handle.write();

        let definition = self.definitions.get(instance.definition_id())?;

        let action =
            definition
                .action(action_id)
                .ok_or_else(|| CoreError::ActionNotFound {
                    definition: definition.id().to_string(),
                    action: action_id.to_string(),
                })?;
        if !action.enabled {
            return Err(CoreError::ActionDisabled {
                action: action.id.clone(),
            });
        }

        let current = match definition.state(instance.current_state_id()) {
            Some(state) => state,
            None => {
                tracing::warn!(
                    "Instance {} is in state '{}' which {} does not define",
                    instance.id(),
                    instance.current_state_id(),
                    definition.id()
                );
                return Err(CoreError::CurrentStateMissing {
                    state: instance.current_state_id().to_string(),
                });
            }
        };
        if !current.enabled {
            return Err(CoreError::CurrentStateDisabled {
                state: current.id.clone(),
            });
        }
        if current.is_final {
            return Err(CoreError::InstanceInFinalState {
                state: current.id.clone(),
            });
        }
        if !action.starts_from(&current.id) {
            return Err(CoreError::InvalidSourceState {
                action: action.id.clone(),
                state: current.id.clone(),
            });
        }

        let target = match definition.state(&action.to_state) {
            Some(state) => state,
            None => {
                tracing::warn!(
                    "Action {} of {} targets undefined state '{}'",
                    action.id,
                    definition.id(),
                    action.to_state
                );
                return Err(CoreError::TargetStateMissing {
                    state: action.to_state.clone(),
                });
            }
        };
        if !target.enabled {
            return Err(CoreError::TargetStateDisabled {
                state: target.id.clone(),
            });
        }

        let entry = HistoryEntry::new(&action.id, &current.id, &target.id);
        instance.apply_transition(entry.clone());

        tracing::debug!(
            "Instance {}: {} --{}--> {}",
            instance.id(),
            entry.from_state_id,
            entry.action_id,
            entry.to_state_id
        );

        Ok(ActionOutcome {
            instance: instance.clone(),
            entry,
            is_final: target.is_final,
        })
    }

    // =========================================================================
    // Restore
    // =========================================================================

    /// Inserts an instance with externally supplied state and history.
    ///
    /// This is the snapshot import path. The definition must exist and the id
    /// must be free, but `current_state_id` and `history` are not checked
    /// against the definition's transitions: the restored state need not be
    /// reachable from the initial state.
    pub fn restore_instance(
        &self,
        instance_id: &str,
        definition_id: &str,
        current_state_id: &str,
        history: Vec<HistoryEntry>,
    ) -> Result<WorkflowInstance, CoreError> {
        let definition = self.definitions.get(definition_id)?;
        let id = resolve_id(Some(instance_id));

        let instance = WorkflowInstance::restored(id, definition.id(), current_state_id, history);
        self.instances.insert(instance.clone())?;

        tracing::debug!(
            "Restored instance {} of {} at {} ({} history entries)",
            instance.id(),
            definition.id(),
            instance.current_state_id(),
            instance.history().len()
        );

        Ok(instance)
    }
}
