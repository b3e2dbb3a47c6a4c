//! # workflowd-core
//!
//! Workflow engine for workflowd.
//!
//! This crate provides:
//! - Workflow definition validation
//! - Definition registry and instance store
//! - The transition engine with per-instance serialization
//! - A restore path for previously exported instances

pub mod definition;
pub mod engine;
pub mod error;
pub mod instance;
pub mod registry;
pub mod store;

pub use definition::{canonical_id, ActionDef, DefinitionSpec, StateDef, WorkflowDefinition};
pub use engine::{ActionOutcome, InstanceView, WorkflowEngine};
pub use error::{CoreError, ErrorKind};
pub use instance::{HistoryEntry, WorkflowInstance};
pub use registry::DefinitionRegistry;
pub use store::InstanceStore;
