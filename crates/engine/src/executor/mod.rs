//! Execution controller: submits a job and drives it to a terminal status.
//!
//! - `submit` issues the asynchronous execute call and parses the immediate response
//! - `poll` re-fetches the stored status document until the job finishes
//! - `execute` is both in sequence
//!
//! Every observed status must be equal to or ahead of the previous one; a regression
//! is reported as [`WpsError::ProtocolInvariant`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;
use wpsprobe_types::{ExecutionRequest, ExecutionResult, WpsError};

use crate::parser::parse_execute_response;
use crate::transport::WpsTransport;

mod poll;

/// Default pause between two status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default cap on status fetches per job.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 900;
/// Default wall-clock budget for one job, measured from submission.
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// Bounds of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            deadline: DEFAULT_POLL_DEADLINE,
        }
    }
}

/// A submitted job and the last status observed for it.
#[derive(Debug, Clone)]
pub struct PollHandle {
    pub last: ExecutionResult,
    pub(crate) submitted_at: Instant,
}

impl PollHandle {
    pub fn process_identifier(&self) -> &str {
        &self.last.process_identifier
    }

    pub fn status_location(&self) -> Option<&str> {
        self.last.status_location.as_deref()
    }
}

/// Submits requests and polls them through one transport.
#[derive(Clone)]
pub struct ExecutionController {
    transport: Arc<dyn WpsTransport>,
    policy: PollPolicy,
}

impl ExecutionController {
    pub fn new(transport: Arc<dyn WpsTransport>, policy: PollPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Issue the execute call and parse the immediate response.
    pub async fn submit(&self, request: &ExecutionRequest) -> Result<PollHandle, WpsError> {
        let submitted_at = Instant::now();
        let body = self.transport.execute(request).await?;
        let last = parse_execute_response(&body)?;
        info!(
            process = %request.process_identifier,
            status = %last.status,
            status_location = last.status_location.as_deref().unwrap_or("-"),
            "job submitted"
        );
        Ok(PollHandle { last, submitted_at })
    }

    /// Poll until the job reaches a terminal status.
    ///
    /// # Errors
    /// - [`WpsError::ProcessFailed`] when the job ends as failed
    /// - [`WpsError::ProtocolInvariant`] on a status regression or a non-terminal
    ///   status without a status location
    /// - [`WpsError::Timeout`] when the attempt cap or the deadline is exceeded
    pub async fn poll(&self, handle: PollHandle) -> Result<ExecutionResult, WpsError> {
        poll::poll_until_terminal(self.transport.as_ref(), &self.policy, handle).await
    }

    /// Submit then poll.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, WpsError> {
        let handle = self.submit(request).await?;
        self.poll(handle).await
    }
}
