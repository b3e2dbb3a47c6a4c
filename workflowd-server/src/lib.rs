//! # workflowd-server
//!
//! HTTP server for workflowd.
//!
//! This crate provides:
//! - HTTP/1.1 connection handling with async I/O
//! - Routing of the workflow API onto the engine
//! - Snapshot export and import endpoints
//! - Configuration loading and Prometheus metrics

pub mod config;
pub mod dto;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;

pub use config::{Config, ConfigError, MetricsConfig, NetworkConfig, StorageConfig};
pub use dto::{ApiError, DefinitionDto, InstanceDto, StartInstanceRequest};
pub use error::ServerError;
pub use handler::{ApiHandler, ApiRequest, ApiResponse};
pub use metrics::{run_metrics_server, Metrics};
pub use server::{Server, ServerConfig, ServerStats};
