//! Workflow definition types.
//!
//! Definitions are submitted as JSON:
//!
//! ```json
//! {
//!   "id": "order",
//!   "name": "Order",
//!   "states": [
//!     {"id": "Draft", "name": "Draft", "isInitial": true},
//!     {"id": "Submitted", "name": "Submitted"},
//!     {"id": "Shipped", "name": "Shipped", "isFinal": true}
//!   ],
//!   "actions": [
//!     {"id": "submit", "name": "Submit", "fromStates": ["Draft"], "toState": "Submitted"},
//!     {"id": "ship", "name": "Ship", "fromStates": ["Submitted"], "toState": "Shipped"}
//!   ]
//! }
//! ```
//!
//! All ids are compared case-insensitively. Lookups go through
//! [`canonical_id`]; the stored values keep the spelling they were declared
//! with.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Canonical form of an id, used as the key for every id-indexed map.
pub fn canonical_id(id: &str) -> String {
    id.to_lowercase()
}

fn default_enabled() -> bool {
    true
}

/// A state in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl StateDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_initial: false,
            is_final: false,
            enabled: true,
        }
    }

    pub fn initial(mut self) -> Self {
        self.is_initial = true;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// An action: a labeled transition from any of `from_states` to `to_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub from_states: Vec<String>,
    #[serde(default)]
    pub to_state: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ActionDef {
    pub fn new<I, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        from_states: I,
        to_state: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            from_states: from_states.into_iter().map(Into::into).collect(),
            to_state: to_state.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns true if `state_id` is one of this action's source states.
    pub fn starts_from(&self, state_id: &str) -> bool {
        let key = canonical_id(state_id);
        self.from_states.iter().any(|s| canonical_id(s) == key)
    }
}

/// Input for creating a definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionSpec {
    /// Requested id. Blank or absent means "generate one".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

impl DefinitionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_state(mut self, state: StateDef) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_action(mut self, action: ActionDef) -> Self {
        self.actions.push(action);
        self
    }

    /// Parses a spec from JSON.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(json)
    }
}

/// Validated, indexed and immutable workflow definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    id: String,
    name: String,
    states: Vec<StateDef>,
    actions: Vec<ActionDef>,
    initial_state_id: String,

    #[serde(skip)]
    state_index: HashMap<String, usize>,
    #[serde(skip)]
    action_index: HashMap<String, usize>,
}

impl WorkflowDefinition {
    /// Validates the parts and builds the definition.
    ///
    /// Checks run in a fixed order and the first failure is returned.
    pub fn from_parts(
        id: impl Into<String>,
        name: impl Into<String>,
        states: Vec<StateDef>,
        actions: Vec<ActionDef>,
    ) -> Result<Self, CoreError> {
        if states.is_empty() {
            return Err(CoreError::EmptyStates);
        }

        let initial_count = states.iter().filter(|s| s.is_initial).count();
        if initial_count != 1 {
            return Err(CoreError::InvalidInitialState {
                count: initial_count,
            });
        }

        if let Some(id) = first_duplicate(states.iter().map(|s| s.id.as_str())) {
            return Err(CoreError::DuplicateStateId { id: id.to_string() });
        }

        if let Some(id) = first_duplicate(actions.iter().map(|a| a.id.as_str())) {
            return Err(CoreError::DuplicateActionId { id: id.to_string() });
        }

        let state_index: HashMap<String, usize> = states
            .iter()
            .enumerate()
            .map(|(i, s)| (canonical_id(&s.id), i))
            .collect();

        for action in &actions {
            let dangling = std::iter::once(&action.to_state)
                .chain(action.from_states.iter())
                .find(|s| !state_index.contains_key(&canonical_id(s)));
            if let Some(state) = dangling {
                return Err(CoreError::UnknownStateReference {
                    action: action.id.clone(),
                    state: state.clone(),
                });
            }
        }

        let action_index = actions
            .iter()
            .enumerate()
            .map(|(i, a)| (canonical_id(&a.id), i))
            .collect();

        // Exactly one initial state was checked above.
        let initial_state_id = states
            .iter()
            .find(|s| s.is_initial)
            .map(|s| s.id.clone())
            .unwrap_or_default();

        Ok(Self {
            id: id.into(),
            name: name.into(),
            states,
            actions,
            initial_state_id,
            state_index,
            action_index,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// States in declaration order.
    pub fn states(&self) -> &[StateDef] {
        &self.states
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> &[ActionDef] {
        &self.actions
    }

    pub fn initial_state_id(&self) -> &str {
        &self.initial_state_id
    }

    /// Looks up a state by id (case-insensitive).
    pub fn state(&self, id: &str) -> Option<&StateDef> {
        self.state_index
            .get(&canonical_id(id))
            .map(|&i| &self.states[i])
    }

    /// Looks up an action by id (case-insensitive).
    pub fn action(&self, id: &str) -> Option<&ActionDef> {
        self.action_index
            .get(&canonical_id(id))
            .map(|&i| &self.actions[i])
    }

    pub fn has_state(&self, id: &str) -> bool {
        self.state(id).is_some()
    }

    /// Returns true if `id` names a final state of this definition.
    pub fn is_final_state(&self, id: &str) -> bool {
        self.state(id).is_some_and(|s| s.is_final)
    }

    /// Returns the actions that could fire from `state_id`, in declaration order.
    ///
    /// Empty when the state is unknown, disabled or final. Actions whose
    /// target state is disabled are left out.
    pub fn available_actions(&self, state_id: &str) -> Vec<&ActionDef> {
        match self.state(state_id) {
            Some(state) if state.enabled && !state.is_final => self
                .actions
                .iter()
                .filter(|a| a.enabled && a.starts_from(&state.id))
                .filter(|a| self.state(&a.to_state).is_some_and(|t| t.enabled))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Returns the first id (by first appearance) that occurs more than once,
/// ignoring case.
fn first_duplicate<'a, I>(ids: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: Vec<(&'a str, usize)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for id in ids {
        match positions.entry(canonical_id(id)) {
            Entry::Occupied(e) => groups[*e.get()].1 += 1,
            Entry::Vacant(e) => {
                e.insert(groups.len());
                groups.push((id, 1));
            }
        }
    }

    groups.into_iter().find(|(_, n)| *n > 1).map(|(id, _)| id)
}
