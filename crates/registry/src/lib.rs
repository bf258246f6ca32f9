//! Registry crate for the wpsprobe job catalog and configuration store.
//!
//! The catalog is the fixed set of [`JobDefinition`]s the runner knows how to
//! run. The configuration store holds the layered `default` + per-host
//! settings that parametrize those jobs for each target server.

pub mod catalog;
pub mod config;
pub mod validation;

pub use catalog::JobCatalog;
pub use config::{ConfigError, ConfigStore, default_config_path};
pub use wpsprobe_types::JobDefinition;
