//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};
use workflowd_core::{ActionDef, HistoryEntry, InstanceView, StateDef, WorkflowDefinition};

/// A definition as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionDto {
    pub id: String,
    pub name: String,
    pub states: Vec<StateDef>,
    pub actions: Vec<ActionDef>,
    pub initial_state_id: String,
}

impl From<&WorkflowDefinition> for DefinitionDto {
    fn from(def: &WorkflowDefinition) -> Self {
        Self {
            id: def.id().to_string(),
            name: def.name().to_string(),
            states: def.states().to_vec(),
            actions: def.actions().to_vec(),
            initial_state_id: def.initial_state_id().to_string(),
        }
    }
}

/// An instance as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDto {
    pub id: String,
    pub definition_id: String,
    pub current_state: String,
    pub is_final: bool,
    pub available_actions: Vec<String>,
    pub history: Vec<HistoryEntry>,
}

impl From<InstanceView> for InstanceDto {
    fn from(view: InstanceView) -> Self {
        Self {
            id: view.instance.id().to_string(),
            definition_id: view.instance.definition_id().to_string(),
            current_state: view.instance.current_state_id().to_string(),
            is_final: view.is_final,
            available_actions: view.available_actions,
            history: view.instance.history().to_vec(),
        }
    }
}

/// Body of `POST /workflow-instances`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstanceRequest {
    #[serde(default)]
    pub definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
