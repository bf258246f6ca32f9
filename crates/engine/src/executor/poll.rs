//! Status polling loop.

use tokio::time::sleep;
use tracing::{debug, info, warn};
use wpsprobe_types::{ExecutionResult, ExecutionStatus, WpsError};

use crate::parser::parse_execute_response;
use crate::transport::WpsTransport;

use super::{PollHandle, PollPolicy};

/// Re-fetch the status document until a terminal status is observed.
///
/// The deadline is measured from submission. A failed job is returned as
/// [`WpsError::ProcessFailed`].
pub(crate) async fn poll_until_terminal(
    transport: &dyn WpsTransport,
    policy: &PollPolicy,
    handle: PollHandle,
) -> Result<ExecutionResult, WpsError> {
    let PollHandle { mut last, submitted_at } = handle;
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;

    while !last.status.is_terminal() {
        let process = last.process_identifier.clone();
        let location = last.status_location.clone().ok_or_else(|| {
            WpsError::protocol(
                &process,
                format!("status {} is not terminal but the response has no statusLocation", last.status),
            )
        })?;

        let timeout = |attempts: u32| {
            let elapsed_ms = u64::try_from(submitted_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            warn!(process = %process, attempts, elapsed_ms, "poll guard tripped");
            WpsError::Timeout {
                process: process.clone(),
                attempts,
                elapsed_ms,
            }
        };

        if attempts >= max_attempts {
            return Err(timeout(attempts));
        }
        let elapsed = submitted_at.elapsed();
        if elapsed >= policy.deadline {
            return Err(timeout(attempts));
        }
        sleep(policy.interval.min(policy.deadline - elapsed)).await;
        if submitted_at.elapsed() >= policy.deadline {
            return Err(timeout(attempts));
        }

        attempts += 1;
        let body = transport.fetch_status(&location).await?;
        let mut next = parse_execute_response(&body)?;

        if next.process_identifier != last.process_identifier {
            return Err(WpsError::protocol(
                &process,
                format!("status document switched to process '{}'", next.process_identifier),
            ));
        }
        if !next.status.can_follow(&last.status) {
            return Err(WpsError::protocol(
                &process,
                format!("status regressed from {} to {}", last.status, next.status),
            ));
        }
        if next.status_location.is_none() {
            next.status_location = Some(location);
        }

        debug!(process = %process, attempts, status = %next.status, "polled status");
        last = next;
    }

    match last.status {
        ExecutionStatus::Failed => {
            warn!(
                process = %last.process_identifier,
                attempts,
                message = last.status_message.as_deref().unwrap_or("-"),
                "job failed"
            );
            Err(WpsError::ProcessFailed(Box::new(last)))
        }
        _ => {
            info!(process = %last.process_identifier, attempts, "job succeeded");
            Ok(last)
        }
    }
}
