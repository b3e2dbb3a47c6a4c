//! Instance state management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action_id: String,
    pub from_state_id: String,
    pub to_state_id: String,
}

impl HistoryEntry {
    pub fn new(
        action_id: impl Into<String>,
        from_state_id: impl Into<String>,
        to_state_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action_id: action_id.into(),
            from_state_id: from_state_id.into(),
            to_state_id: to_state_id.into(),
        }
    }
}

/// A running instance of a workflow definition.
///
/// Fields are read-only outside this crate; the engine is the only writer of
/// `current_state_id` and `history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    id: String,
    definition_id: String,
    current_state_id: String,
    history: Vec<HistoryEntry>,
}

impl WorkflowInstance {
    /// Creates a new instance positioned at `initial_state_id`.
    pub(crate) fn new(
        id: impl Into<String>,
        definition_id: impl Into<String>,
        initial_state_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            definition_id: definition_id.into(),
            current_state_id: initial_state_id.into(),
            history: Vec::new(),
        }
    }

    /// Rebuilds an instance from previously exported state.
    ///
    /// No transition rules are applied: `current_state_id` and `history` are
    /// taken as given.
    pub(crate) fn restored(
        id: impl Into<String>,
        definition_id: impl Into<String>,
        current_state_id: impl Into<String>,
        history: Vec<HistoryEntry>,
    ) -> Self {
        Self {
            id: id.into(),
            definition_id: definition_id.into(),
            current_state_id: current_state_id.into(),
            history,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn current_state_id(&self) -> &str {
        &self.current_state_id
    }

    /// Executed transitions, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Records a transition and moves to its target state.
    pub(crate) fn apply_transition(&mut self, entry: HistoryEntry) {
        self.current_state_id = entry.to_state_id.clone();
        self.history.push(entry);
    }
}
