//! Long-running operation handles and the shared waiter.

use tokio_util::sync::CancellationToken;

use crate::error::{ClientFuture, DeployError};
use crate::poller::{PollOutcome, PollPolicy, guarded, poll_until};

/// Handle for a provider long-running operation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Operation {
    /// Operation name as reported by the provider.
    pub name: String,
    /// Absolute URL used to refresh the operation.
    pub poll_url: String,
    /// Whether the operation reached a terminal state.
    pub done: bool,
    /// Error messages attached to a failed operation.
    pub errors: Vec<String>,
}

impl Operation {
    /// Handle for work the provider finished synchronously.
    #[must_use]
    pub fn completed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            poll_url: String::new(),
            done: true,
            errors: Vec::new(),
        }
    }

    fn outcome(self) -> PollOutcome<Self> {
        if !self.done {
            return PollOutcome::Pending;
        }
        if self.errors.is_empty() {
            PollOutcome::Succeeded(self)
        } else {
            PollOutcome::Failed(self.errors)
        }
    }
}

/// Refreshes operation handles.
pub trait OperationSource: Send + Sync {
    /// Fetches the current state of `operation`.
    fn refresh_operation<'a>(&'a self, operation: &'a Operation) -> ClientFuture<'a, Operation>;
}

/// Waits for `operation` to finish, refreshing it through `source`.
///
/// # Errors
///
/// Returns the poller's timeout, cancellation and failure errors, or a
/// provider error when a refresh fails.
pub async fn wait_for_operation(
    cancel: &CancellationToken,
    source: &dyn OperationSource,
    policy: PollPolicy,
    label: &str,
    operation: Operation,
) -> Result<Operation, DeployError> {
    if operation.done {
        if operation.errors.is_empty() {
            return Ok(operation);
        }
        return Err(DeployError::OperationFailed {
            operation: label.to_owned(),
            message: operation.errors.join("; "),
        });
    }
    let handle = &operation;
    poll_until(cancel, policy, label, move || async move {
        let refreshed = guarded(
            cancel,
            &format!("refresh operation {}", handle.name),
            source.refresh_operation(handle),
        )
        .await?;
        Ok(refreshed.outcome())
    })
    .await
}
