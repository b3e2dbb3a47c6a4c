//! Snapshot document schema, export and import.
//!
//! A snapshot captures every definition and instance of an engine:
//!
//! ```json
//! {
//!   "formatVersion": 1,
//!   "createdAt": "2026-01-01T00:00:00Z",
//!   "definitions": [{"id": "order", "name": "Order", "states": [], "actions": [], "initialStateId": "Draft"}],
//!   "instances": [{"id": "o-1", "definitionId": "order", "currentStateId": "Draft", "history": []}]
//! }
//! ```
//!
//! Import replays definitions through normal creation, so they are validated
//! exactly like live submissions. Instances take the restore path instead:
//! their current state and history are copied verbatim, without checking that
//! the history is a legal walk of the definition.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use workflowd_core::{
    ActionDef, DefinitionSpec, HistoryEntry, StateDef, WorkflowDefinition, WorkflowEngine,
    WorkflowInstance,
};

/// Snapshot format version written by this build.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A definition as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    /// Informational; recomputed from `states` on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state_id: Option<String>,
}

impl From<&WorkflowDefinition> for DefinitionRecord {
    fn from(def: &WorkflowDefinition) -> Self {
        Self {
            id: def.id().to_string(),
            name: def.name().to_string(),
            states: def.states().to_vec(),
            actions: def.actions().to_vec(),
            initial_state_id: Some(def.initial_state_id().to_string()),
        }
    }
}

impl DefinitionRecord {
    /// Converts the record back into creation input.
    pub fn into_spec(self) -> DefinitionSpec {
        DefinitionSpec {
            id: Some(self.id),
            name: self.name,
            states: self.states,
            actions: self.actions,
        }
    }
}

/// An instance as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub id: String,
    pub definition_id: String,
    pub current_state_id: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl From<&WorkflowInstance> for InstanceRecord {
    fn from(instance: &WorkflowInstance) -> Self {
        Self {
            id: instance.id().to_string(),
            definition_id: instance.definition_id().to_string(),
            current_state_id: instance.current_state_id().to_string(),
            history: instance.history().to_vec(),
        }
    }
}

/// Counts from a snapshot import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub definitions_restored: usize,
    pub definitions_skipped: usize,
    pub instances_restored: usize,
    pub instances_skipped: usize,
}

/// Full engine snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub definitions: Vec<DefinitionRecord>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

impl Snapshot {
    /// Captures the current contents of an engine.
    pub fn capture(engine: &WorkflowEngine) -> Self {
        let definitions = engine
            .list_definitions()
            .iter()
            .map(|d| DefinitionRecord::from(d.as_ref()))
            .collect();
        let instances = engine
            .list_instances()
            .iter()
            .map(InstanceRecord::from)
            .collect();

        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            definitions,
            instances,
        }
    }

    /// Parses a snapshot document and checks its format version.
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_json_pretty(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn check_version(&self) -> Result<(), StorageError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: self.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(())
    }

    /// Imports this snapshot into `engine`.
    ///
    /// Existing contents are kept. Definitions that fail validation or whose
    /// id is taken are skipped; so are instances whose definition is missing
    /// or whose id is taken. Skips are logged and counted, never fatal.
    pub fn restore_into(&self, engine: &WorkflowEngine) -> Result<RestoreReport, StorageError> {
        self.check_version()?;
        let mut report = RestoreReport::default();

        for record in &self.definitions {
            match engine.create_definition(record.clone().into_spec()) {
                Ok(_) => report.definitions_restored += 1,
                Err(e) => {
                    tracing::warn!("Skipping definition {} on import: {}", record.id, e);
                    report.definitions_skipped += 1;
                }
            }
        }

        for record in &self.instances {
            match engine.restore_instance(
                &record.id,
                &record.definition_id,
                &record.current_state_id,
                record.history.clone(),
            ) {
                Ok(_) => report.instances_restored += 1,
                Err(e) => {
                    tracing::warn!("Skipping instance {} on import: {}", record.id, e);
                    report.instances_skipped += 1;
                }
            }
        }

        tracing::info!(
            "Snapshot import: {} definitions ({} skipped), {} instances ({} skipped)",
            report.definitions_restored,
            report.definitions_skipped,
            report.instances_restored,
            report.instances_skipped
        );

        Ok(report)
    }
}
