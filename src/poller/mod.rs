//! Waiting on long-running cloud operations.
//!
//! Every provider path funnels its waits through [`poll_until`]: the stack
//! waiter, the project creation and deletion waiters, and each per-resource
//! operation waiter. Client calls made outside a poll loop go through
//! [`guarded`] or [`race_cancel`] so that a fired cancellation token aborts
//! them without waiting for the remote call to settle.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ClientError, DeployError};

/// Interval and overall bound for a poll loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Pause between status checks.
    pub interval: Duration,
    /// Overall bound after which the wait fails with a timeout.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Policy for templated stack operations.
    pub const STACK: Self = Self::new(Duration::from_secs(10), Duration::from_secs(60 * 60));
    /// Policy for single-resource operations (networks, services, ...).
    pub const RESOURCE: Self = Self::new(Duration::from_secs(5), Duration::from_secs(10 * 60));
    /// Policy for project-level operations.
    pub const PROJECT: Self = Self::new(Duration::from_secs(10), Duration::from_secs(30 * 60));

    /// Builds a policy from an interval and an overall timeout.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Classification of a single status check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome<T> {
    /// The operation has not reached a terminal state yet.
    Pending,
    /// The operation finished successfully.
    Succeeded(T),
    /// The operation finished in a failure state; carries every message the
    /// provider attached.
    Failed(Vec<String>),
}

/// Polls `check` until it reports a terminal outcome.
///
/// The first check runs immediately; subsequent checks run every
/// `policy.interval`. Cancellation and the overall deadline are observed
/// both while a check is in flight and while sleeping between checks.
///
/// # Errors
///
/// Returns [`DeployError::Cancelled`] when `cancel` fires,
/// [`DeployError::Timeout`] when `policy.timeout` elapses before a terminal
/// outcome, [`DeployError::OperationFailed`] when the check reports
/// [`PollOutcome::Failed`], or whatever error the check itself returns.
pub async fn poll_until<T, F, Fut>(
    cancel: &CancellationToken,
    policy: PollPolicy,
    operation: &str,
    mut check: F,
) -> Result<T, DeployError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>, DeployError>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(operation)),
            outcome = check() => outcome?,
            () = sleep_until(deadline) => return Err(timed_out(operation, started)),
        };

        match outcome {
            PollOutcome::Succeeded(value) => {
                debug!(operation, attempt, "operation reached terminal success");
                return Ok(value);
            }
            PollOutcome::Failed(messages) => {
                return Err(DeployError::OperationFailed {
                    operation: operation.to_owned(),
                    message: join_messages(&messages),
                });
            }
            PollOutcome::Pending => {
                debug!(operation, attempt, "operation still in progress");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(operation, started));
        }

        let pause = policy.interval.min(deadline.duration_since(now));
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(operation)),
            () = sleep(pause) => {}
        }
    }
}

/// Races a client call against the cancellation token, leaving the client
/// result untouched so the caller can inspect its classification.
///
/// # Errors
///
/// Returns [`DeployError::Cancelled`] when `cancel` fires first.
pub async fn race_cancel<T, Fut>(
    cancel: &CancellationToken,
    action: &str,
    call: Fut,
) -> Result<Result<T, ClientError>, DeployError>
where
    Fut: Future<Output = Result<T, ClientError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancelled(action)),
        result = call => Ok(result),
    }
}

/// Races a client call against the cancellation token and wraps any client
/// failure with the attempted action.
///
/// # Errors
///
/// Returns [`DeployError::Cancelled`] when `cancel` fires first and
/// [`DeployError::Provider`] when the call fails.
pub async fn guarded<T, Fut>(
    cancel: &CancellationToken,
    action: &str,
    call: Fut,
) -> Result<T, DeployError>
where
    Fut: Future<Output = Result<T, ClientError>>,
{
    race_cancel(cancel, action, call)
        .await?
        .map_err(|err| DeployError::provider(action, &err))
}

fn cancelled(operation: &str) -> DeployError {
    DeployError::Cancelled {
        operation: operation.to_owned(),
    }
}

fn timed_out(operation: &str, started: Instant) -> DeployError {
    DeployError::Timeout {
        operation: operation.to_owned(),
        waited_secs: started.elapsed().as_secs(),
    }
}

fn join_messages(messages: &[String]) -> String {
    let parts: Vec<&str> = messages
        .iter()
        .map(|message| message.trim())
        .filter(|message| !message.is_empty())
        .collect();
    if parts.is_empty() {
        return String::from("provider reported failure without details");
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests;
