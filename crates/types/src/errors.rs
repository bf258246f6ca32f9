use thiserror::Error;

use crate::ExecutionResult;

/// Every failure a single run can report.
///
/// Variants map one-to-one onto the outcome categories written to the run report,
/// see [`WpsError::kind`].
#[derive(Debug, Error)]
pub enum WpsError {
    #[error("malformed WPS response: {0}")]
    Parse(String),

    #[error("unsupported output shape for '{output}': {reason}")]
    UnsupportedOutputShape { output: String, reason: String },

    #[error("protocol invariant violated by '{process}': {message}")]
    ProtocolInvariant { process: String, message: String },

    #[error(
        "process '{}' failed: {}",
        .0.process_identifier,
        .0.status_message.as_deref().unwrap_or("no status message")
    )]
    ProcessFailed(Box<ExecutionResult>),

    #[error("process '{process}' did not finish after {attempts} polls ({elapsed_ms} ms)")]
    Timeout { process: String, attempts: u32, elapsed_ms: u64 },

    #[error("output '{output}' not present in result (available: {})", .available.join(", "))]
    MissingOutput { output: String, available: Vec<String> },

    #[error("output chain deeper than the allowed depth of {max_depth}")]
    ChainDepthExceeded { max_depth: u32 },

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("missing configuration value '{key}' for host '{host}'")]
    MissingConfiguration { key: String, host: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("pre-flight check failed for '{process}': {reason}")]
    Preflight { process: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl WpsError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse(reason.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn download(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(process: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProtocolInvariant {
            process: process.into(),
            message: message.into(),
        }
    }

    /// Configuration problems mark a run as skipped rather than failed.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::MissingConfiguration { .. })
    }

    /// Stable snake_case label used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_error",
            Self::UnsupportedOutputShape { .. } => "unsupported_output_shape",
            Self::ProtocolInvariant { .. } => "protocol_invariant_violation",
            Self::ProcessFailed(_) => "process_failed",
            Self::Timeout { .. } => "timeout",
            Self::MissingOutput { .. } => "missing_output",
            Self::ChainDepthExceeded { .. } => "chain_depth_exceeded",
            Self::Download { .. } => "download_error",
            Self::MissingConfiguration { .. } => "missing_configuration",
            Self::Configuration(_) => "configuration_error",
            Self::Preflight { .. } => "preflight_error",
            Self::Transport(_) => "transport_error",
        }
    }
}
