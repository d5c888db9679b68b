//! Error taxonomy shared by every provider path.
//!
//! [`DeployError`] is what callers of the deployer contract observe.
//! [`ClientError`] is the narrower error raised at the cloud client seam;
//! it is classified (not-found, already-exists, permission-denied) so the
//! convergence logic can turn specific shapes into booleans instead of
//! failures.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::config::ConfigError;
use crate::project::Domain;

/// Future returned by cloud client operations.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// Errors raised by the deployer contract.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeployError {
    /// Raised when a provider token does not name a supported provider.
    #[error("unsupported provider '{token}' (supported: {supported})")]
    UnsupportedProvider {
        /// Token supplied by the caller.
        token: String,
        /// Comma separated list of accepted tokens.
        supported: String,
    },
    /// Raised when the target or one of its resources is absent.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },
    /// Raised when a create call collides with an existing resource.
    #[error("{what} already exists")]
    AlreadyExists {
        /// Description of the colliding entity.
        what: String,
    },
    /// Raised when a poll loop exceeds its overall bound.
    #[error("timed out after {waited_secs}s waiting for {operation}")]
    Timeout {
        /// Operation being waited on.
        operation: String,
        /// Seconds spent before giving up.
        waited_secs: u64,
    },
    /// Raised when an operation reaches a terminal failure state.
    #[error("{operation} failed: {message}")]
    OperationFailed {
        /// Operation that failed.
        operation: String,
        /// Every message the provider attached to the failure, joined.
        message: String,
    },
    /// Raised when the caller's cancellation token fires mid-call.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// Operation in flight when cancellation was observed.
        operation: String,
    },
    /// Raised when required configuration or clients are missing.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Raised when a request is missing a required option or carries a
    /// malformed value.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Wrapper for client failures, tagged with the attempted action.
    #[error("failed to {action}: {message}")]
    Provider {
        /// Action that was attempted (for example `create topic task-events`).
        action: String,
        /// Message reported by the client.
        message: String,
    },
    /// Raised when a convergence domain fails; later domains are skipped.
    #[error("{domain} convergence failed: {source}")]
    Converge {
        /// Domain that failed.
        domain: Domain,
        /// Underlying failure.
        source: Box<DeployError>,
    },
    /// Raised at the end of a best-effort teardown when any domain failed.
    #[error("teardown incomplete: {}", render_failures(.failures))]
    Teardown {
        /// Every failure encountered, in teardown order.
        failures: Vec<DomainFailure>,
    },
}

impl DeployError {
    /// Wraps a client failure with the name of the attempted action.
    #[must_use]
    pub fn provider(action: &str, err: &ClientError) -> Self {
        Self::Provider {
            action: action.to_owned(),
            message: err.to_string(),
        }
    }

    /// Returns `true` when this error stems from cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<ConfigError> for DeployError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

/// One failed step of a best-effort teardown.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DomainFailure {
    /// Domain whose teardown failed.
    pub domain: Domain,
    /// Failure reported for that domain.
    pub error: DeployError,
}

impl fmt::Display for DomainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.domain, self.error)
    }
}

fn render_failures(failures: &[DomainFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by cloud API clients.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClientError {
    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The resource already exists (lost a creation race).
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// The caller lacks access, or the resource may not exist.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Any other API level failure.
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status or provider specific code.
        status: u16,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the request could not be delivered.
    #[error("transport error: {0}")]
    Transport(String),
    /// Raised when a response cannot be interpreted.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Returns the provider message without the classification prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(message)
            | Self::AlreadyExists(message)
            | Self::PermissionDenied(message)
            | Self::Transport(message)
            | Self::Decode(message)
            | Self::Api { message, .. } => message,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn teardown_error_lists_every_domain() {
        let err = DeployError::Teardown {
            failures: vec![
                DomainFailure {
                    domain: Domain::Logging,
                    error: DeployError::Validation(String::from("boom")),
                },
                DomainFailure {
                    domain: Domain::Network,
                    error: DeployError::NotFound {
                        what: String::from("subnet"),
                    },
                },
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("logging: invalid request: boom"), "{rendered}");
        assert!(rendered.contains("network: subnet not found"), "{rendered}");
    }

    #[rstest]
    #[case(ClientError::NotFound(String::from("gone")), "gone")]
    #[case(ClientError::Api { status: 500, message: String::from("oops") }, "oops")]
    fn client_error_message_strips_prefix(#[case] err: ClientError, #[case] expected: &str) {
        assert_eq!(err.message(), expected);
    }

    #[rstest]
    fn provider_wraps_action_name() {
        let err = DeployError::provider(
            "create topic task-events",
            &ClientError::Transport(String::from("reset")),
        );
        assert_eq!(
            err.to_string(),
            "failed to create topic task-events: transport error: reset"
        );
    }
}
