//! Shared type definitions for wpsprobe.
//!
//! These types describe the WPS execution model (requests, statuses, results),
//! the job catalog entries and host profiles used to build the run matrix, and
//! the [`WpsError`] taxonomy surfaced by every stage of the pipeline.

pub mod errors;
pub mod execution;
pub mod host;
pub mod job;

pub use errors::WpsError;
pub use execution::{ExecutionRequest, ExecutionResult, ExecutionStatus, InputValue, OutputValue, ProcessDescriptor};
pub use host::{HostProfile, JobFilter};
pub use job::{JobDefinition, ParamSource, ParamSpec, Preprocessor, ResolvedRun};

/// Name of the configuration layer every host layer falls back to.
pub const DEFAULT_LAYER: &str = "default";
