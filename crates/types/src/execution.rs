//! WPS execution model: what gets submitted and what comes back.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::WpsError;

/// Description of a remote process, as returned by `DescribeProcess`.
///
/// Only used for pre-flight validation of an [`ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    /// Process identifier (`ows:Identifier`).
    pub identifier: String,
    /// Declared input identifiers in document order.
    pub inputs: IndexSet<String>,
    /// Declared output identifiers.
    pub outputs: IndexSet<String>,
}

impl ProcessDescriptor {
    /// Verify that every requested input is declared and that the desired output exists.
    pub fn check_request(&self, request: &ExecutionRequest) -> Result<(), WpsError> {
        let undeclared: IndexSet<&str> = request.input_names().filter(|name| !self.inputs.contains(*name)).collect();
        if !undeclared.is_empty() {
            return Err(WpsError::Preflight {
                process: self.identifier.clone(),
                reason: format!(
                    "inputs not declared by the process: {} (declared: {})",
                    undeclared.iter().copied().collect::<Vec<_>>().join(", "),
                    join_set(&self.inputs)
                ),
            });
        }
        if !self.outputs.contains(&request.output_name) {
            return Err(WpsError::Preflight {
                process: self.identifier.clone(),
                reason: format!(
                    "output '{}' is not declared by the process (declared: {})",
                    request.output_name,
                    join_set(&self.outputs)
                ),
            });
        }
        Ok(())
    }
}

fn join_set(set: &IndexSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// A single input value handed to the remote process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputValue {
    /// Inline literal data.
    Literal(String),
    /// Complex data passed by reference (the server fetches the href).
    Reference(String),
}

impl InputValue {
    pub fn as_str(&self) -> &str {
        match self {
            InputValue::Literal(value) | InputValue::Reference(value) => value,
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Literal(value) => write!(f, "{value}"),
            InputValue::Reference(href) => write!(f, "@{href}"),
        }
    }
}

/// A job submission: process, ordered inputs (names may repeat) and the output to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub process_identifier: String,
    pub inputs: Vec<(String, InputValue)>,
    pub output_name: String,
}

impl ExecutionRequest {
    pub fn new(process_identifier: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            process_identifier: process_identifier.into(),
            inputs: Vec::new(),
            output_name: output_name.into(),
        }
    }

    /// Append an input entry. Repeated names are kept as separate entries.
    pub fn with_input(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.inputs.push((name.into(), value));
        self
    }

    /// Input names in submission order, repeated names included.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|(name, _)| name.as_str())
    }
}

/// Execution status of a remote job.
///
/// Statuses are ranked `Accepted < Started < {Succeeded, Failed}`; the last two
/// are terminal. Status observations for one job must never move backwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Accepted,
    Started { percent_complete: f64 },
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed)
    }

    pub fn rank(&self) -> u8 {
        match self {
            ExecutionStatus::Accepted => 0,
            ExecutionStatus::Started { .. } => 1,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed => 2,
        }
    }

    /// Returns true when `self` is a legal observation after `previous`.
    ///
    /// Equal statuses are legal, as is any forward move. A terminal status may only
    /// be followed by itself, and `Started` progress may not decrease.
    pub fn can_follow(&self, previous: &ExecutionStatus) -> bool {
        if previous.is_terminal() {
            return std::mem::discriminant(self) == std::mem::discriminant(previous);
        }
        match (previous, self) {
            (
                ExecutionStatus::Started {
                    percent_complete: before,
                },
                ExecutionStatus::Started {
                    percent_complete: after,
                },
            ) => after >= before,
            _ => self.rank() >= previous.rank(),
        }
    }

    /// The WPS element name of the status marker.
    pub fn marker(&self) -> &'static str {
        match self {
            ExecutionStatus::Accepted => "ProcessAccepted",
            ExecutionStatus::Started { .. } => "ProcessStarted",
            ExecutionStatus::Succeeded => "ProcessSucceeded",
            ExecutionStatus::Failed => "ProcessFailed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Started { percent_complete } => write!(f, "{} ({percent_complete}%)", self.marker()),
            other => write!(f, "{}", other.marker()),
        }
    }
}

/// Value of a named process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputValue {
    /// Inline literal text.
    Literal { value: String },
    /// Link to the artifact, or to a document listing further links.
    Reference { href: String, mime_type: Option<String> },
}

impl OutputValue {
    pub fn literal(value: impl Into<String>) -> Self {
        OutputValue::Literal { value: value.into() }
    }

    pub fn reference(href: impl Into<String>, mime_type: Option<String>) -> Self {
        OutputValue::Reference {
            href: href.into(),
            mime_type,
        }
    }
}

/// Immutable snapshot of one execute/status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub process_identifier: String,
    /// `creationTime` as sent by the server.
    pub raw_creation_time: String,
    /// `None` when the server's `creationTime` matches no known layout.
    pub creation_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Free text attached to the status marker; exception texts when the job failed.
    pub status_message: Option<String>,
    /// Where the status document can be re-fetched, when the server stores it.
    pub status_location: Option<String>,
    /// Populated only when the status is `Succeeded`.
    pub outputs: IndexMap<String, OutputValue>,
}

impl ExecutionResult {
    pub fn output(&self, name: &str) -> Option<&OutputValue> {
        self.outputs.get(name)
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }
}
