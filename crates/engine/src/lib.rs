//! # wpsprobe engine
//!
//! The engine turns a job catalog and a layered configuration into WPS executions
//! and reports what each host produced.
//!
//! ## Key Features
//!
//! - **Response parsing**: decodes WPS 1.0.0 execute/status documents and process descriptions
//! - **Execution control**: submits asynchronous jobs and polls them under a deadline
//! - **Output resolution**: follows chained JSON link documents to the final artifact
//! - **Downloads**: streams artifacts to disk below a per-run directory
//! - **Test matrix**: expands hosts × jobs with per-host include/exclude filters
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use wpsprobe_engine::{HostSelector, MatrixEntry, TestMatrix};
//! use wpsprobe_registry::{ConfigStore, JobCatalog};
//!
//! let store = ConfigStore::from_yaml_str(r#"
//! default:
//!   ncmerge/resource: http://data.example/a.nc, http://data.example/b.nc
//! local:
//!   wps: http://localhost:8093/wps
//!   include: ncmerge
//! "#)?;
//!
//! let matrix = TestMatrix::build(Arc::new(JobCatalog::builtin()), Arc::new(store), &HostSelector::All)?;
//! for entry in matrix.entries() {
//!     if let MatrixEntry::Runnable(run) = entry {
//!         println!("{} -> {} inputs", run.label(), run.to_request().inputs.len());
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`parser`**: XML decoding into [`wpsprobe_types::ExecutionResult`] and [`wpsprobe_types::ProcessDescriptor`]
//! - **`transport`**: the [`WpsTransport`] seam and its HTTP implementation
//! - **`executor`**: [`ExecutionController`] submit/poll state machine
//! - **`resolve`**: [`OutputResolver`]
//! - **`download`**: [`Downloader`]
//! - **`config`**: [`ConfigResolver`] parameter lookup
//! - **`matrix`** / **`runner`**: building and running the host × job matrix

pub mod config;
pub mod download;
pub mod executor;
pub mod matrix;
pub mod parser;
pub mod resolve;
pub mod runner;
pub mod transport;

pub use config::ConfigResolver;
pub use download::Downloader;
pub use executor::{ExecutionController, PollHandle, PollPolicy};
pub use matrix::{HostSelector, MatrixEntry, TestMatrix};
pub use parser::{parse_execute_response, parse_process_description};
pub use resolve::{OutputResolver, ResolvedOutput};
pub use runner::{Artifact, MatrixRunner, RecordSummary, RunOutcome, RunRecord, RunReport, RunnerOptions};
pub use transport::{HttpTransport, HttpTransportProvider, TransportProvider, WpsTransport};
