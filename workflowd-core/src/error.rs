//! Core error types.

use thiserror::Error;

/// Broad classification of a [`CoreError`].
///
/// Outer layers use this to pick a response status without matching every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The submitted definition is structurally unsound.
    Validation,
    /// An id is already taken.
    Conflict,
    /// A referenced definition, instance or action does not exist.
    Lookup,
    /// The requested transition may not fire.
    Transition,
}

/// Errors from the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("definition must contain at least one state")]
    EmptyStates,

    #[error("definition must contain exactly one initial state, found {count}")]
    InvalidInitialState { count: usize },

    #[error("duplicate state id: {id}")]
    DuplicateStateId { id: String },

    #[error("duplicate action id: {id}")]
    DuplicateActionId { id: String },

    #[error("action '{action}' references unknown state '{state}'")]
    UnknownStateReference { action: String, state: String },

    #[error("definition id '{id}' already exists")]
    DuplicateDefinitionId { id: String },

    #[error("instance id '{id}' already exists")]
    DuplicateInstanceId { id: String },

    #[error("definition '{id}' not found")]
    DefinitionNotFound { id: String },

    #[error("instance '{id}' not found")]
    InstanceNotFound { id: String },

    #[error("action '{action}' not found in definition '{definition}'")]
    ActionNotFound { definition: String, action: String },

    #[error("action '{action}' is disabled")]
    ActionDisabled { action: String },

    #[error("current state '{state}' missing in definition")]
    CurrentStateMissing { state: String },

    #[error("current state '{state}' is disabled")]
    CurrentStateDisabled { state: String },

    #[error("instance is in final state '{state}'; no further actions allowed")]
    InstanceInFinalState { state: String },

    #[error("action '{action}' cannot be executed from state '{state}'")]
    InvalidSourceState { action: String, state: String },

    #[error("target state '{state}' missing in definition")]
    TargetStateMissing { state: String },

    #[error("target state '{state}' is disabled")]
    TargetStateDisabled { state: String },
}

impl CoreError {
    /// Returns the broad kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::EmptyStates
            | CoreError::InvalidInitialState { .. }
            | CoreError::DuplicateStateId { .. }
            | CoreError::DuplicateActionId { .. }
            | CoreError::UnknownStateReference { .. } => ErrorKind::Validation,

            CoreError::DuplicateDefinitionId { .. } | CoreError::DuplicateInstanceId { .. } => {
                ErrorKind::Conflict
            }

            CoreError::DefinitionNotFound { .. }
            | CoreError::InstanceNotFound { .. }
            | CoreError::ActionNotFound { .. } => ErrorKind::Lookup,

            CoreError::ActionDisabled { .. }
            | CoreError::CurrentStateMissing { .. }
            | CoreError::CurrentStateDisabled { .. }
            | CoreError::InstanceInFinalState { .. }
            | CoreError::InvalidSourceState { .. }
            | CoreError::TargetStateMissing { .. }
            | CoreError::TargetStateDisabled { .. } => ErrorKind::Transition,
        }
    }

    /// Returns an error code suitable for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::EmptyStates => "EMPTY_STATES",
            CoreError::InvalidInitialState { .. } => "INVALID_INITIAL_STATE",
            CoreError::DuplicateStateId { .. } => "DUPLICATE_STATE_ID",
            CoreError::DuplicateActionId { .. } => "DUPLICATE_ACTION_ID",
            CoreError::UnknownStateReference { .. } => "UNKNOWN_STATE_REFERENCE",
            CoreError::DuplicateDefinitionId { .. } => "DUPLICATE_DEFINITION_ID",
            CoreError::DuplicateInstanceId { .. } => "DUPLICATE_INSTANCE_ID",
            CoreError::DefinitionNotFound { .. } => "DEFINITION_NOT_FOUND",
            CoreError::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            CoreError::ActionNotFound { .. } => "ACTION_NOT_FOUND",
            CoreError::ActionDisabled { .. } => "ACTION_DISABLED",
            CoreError::CurrentStateMissing { .. } => "CURRENT_STATE_MISSING",
            CoreError::CurrentStateDisabled { .. } => "CURRENT_STATE_DISABLED",
            CoreError::InstanceInFinalState { .. } => "INSTANCE_IN_FINAL_STATE",
            CoreError::InvalidSourceState { .. } => "INVALID_SOURCE_STATE",
            CoreError::TargetStateMissing { .. } => "TARGET_STATE_MISSING",
            CoreError::TargetStateDisabled { .. } => "TARGET_STATE_DISABLED",
        }
    }
}
