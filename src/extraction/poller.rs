//! Bounded status polling for submitted tasks.

use crate::backend::ExtractionBackend;
use crate::config::Config;
use crate::extraction::types::{ExtractionError, ExtractionResult, TaskHandle, TaskStatus};
use std::time::Duration;

/// Attempt budget and fixed delay between status queries.
///
/// A fixed interval keeps the worst case predictable: `max_attempts` queries separated by
/// `max_attempts - 1` delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status queries.
    pub max_attempts: u32,
    /// Sleep between two queries.
    pub delay: Duration,
}

impl PollPolicy {
    /// Build a policy from explicit values.
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Policy derived from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.poll_max_attempts, config.poll_delay())
    }

    /// Upper bound on the time spent sleeping between queries.
    pub fn worst_case_wait(&self) -> Duration {
        self.delay
            .saturating_mul(self.max_attempts.max(1).saturating_sub(1))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(30, Duration::from_millis(1000))
    }
}

/// Poll `handle` until it completes, fails, or the attempt budget runs out.
///
/// Backend-reported failures and transport/protocol errors end the loop immediately; only
/// `Pending` and `Processing` are retried. The wait between attempts is a timer, so other
/// tasks on the runtime keep making progress.
pub async fn wait_for_result<B>(
    backend: &B,
    handle: &TaskHandle,
    policy: &PollPolicy,
) -> Result<ExtractionResult, ExtractionError>
where
    B: ExtractionBackend + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let status = backend.query_status(handle).await.inspect_err(|err| {
            tracing::warn!(task = %handle, attempt, error = %err, "Status query failed");
        })?;
        tracing::debug!(
            task = %handle,
            attempt,
            max_attempts,
            terminal = status.is_terminal(),
            "Polled extraction status"
        );

        match status {
            TaskStatus::Completed(result) => return Ok(result),
            TaskStatus::Failed(reason) => {
                tracing::warn!(
                    task = %handle,
                    attempt,
                    reason = %reason,
                    "Extraction task failed"
                );
                return Err(ExtractionError::Failed(reason));
            }
            TaskStatus::Pending | TaskStatus::Processing => {
                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    tracing::warn!(task = %handle, attempts = max_attempts, "Extraction task timed out");
    Err(ExtractionError::Timeout {
        handle: handle.clone(),
        attempts: max_attempts,
    })
}
