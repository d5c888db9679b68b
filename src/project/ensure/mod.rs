//! Idempotent create-if-absent operations, one module per resource domain.
//!
//! Every ensure follows the same shape: look the resource up, create it when
//! absent (treating a lost creation race as success), wait on any operation
//! the create returned, then read the identifiers back. Teardown functions
//! treat an already-missing resource as deleted.

pub mod compute;
pub mod datastore;
pub mod encryption;
pub mod events;
pub mod identity;
pub mod logging;
pub mod messaging;
pub mod network;
pub mod registry;
pub mod scheduling;

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, DeployError};
use crate::poller::{PollPolicy, race_cancel};

use super::clients::ResourceClients;
use super::operation::{Operation, wait_for_operation};
use super::resources::ResourceConfig;

/// Shared state for one converge or teardown pass.
pub struct Context<'a> {
    /// Cancellation signal for the whole pass.
    pub cancel: &'a CancellationToken,
    clients: &'a ResourceClients,
    config: &'a ResourceConfig,
    /// Policy for single-resource operation waits.
    pub policy: PollPolicy,
    created: Vec<String>,
}

impl<'a> Context<'a> {
    /// Starts a pass with an empty change log.
    #[must_use]
    pub const fn new(
        cancel: &'a CancellationToken,
        clients: &'a ResourceClients,
        config: &'a ResourceConfig,
        policy: PollPolicy,
    ) -> Self {
        Self {
            cancel,
            clients,
            config,
            policy,
            created: Vec::new(),
        }
    }

    /// Per-domain clients.
    #[must_use]
    pub const fn clients(&self) -> &'a ResourceClients {
        self.clients
    }

    /// Desired configuration.
    #[must_use]
    pub const fn config(&self) -> &'a ResourceConfig {
        self.config
    }

    /// Project the pass operates on.
    #[must_use]
    pub fn project(&self) -> &'a str {
        &self.config.project_id
    }

    /// Region the pass operates in.
    #[must_use]
    pub fn region(&self) -> &'a str {
        &self.config.region
    }

    /// Records that the pass created or changed something.
    pub fn record_change(&mut self, what: String) {
        info!(project = %self.config.project_id, change = %what, "applied change");
        self.created.push(what);
    }

    /// Consumes the context, returning the recorded changes.
    #[must_use]
    pub fn into_changes(self) -> Vec<String> {
        self.created
    }

    /// Waits on a long-running operation with the resource policy.
    ///
    /// # Errors
    ///
    /// Propagates poller timeout, cancellation and failure errors.
    pub async fn wait(&self, label: &str, operation: Operation) -> Result<Operation, DeployError> {
        wait_for_operation(
            self.cancel,
            self.clients.operations.as_ref(),
            self.policy,
            label,
            operation,
        )
        .await
    }

    /// Runs a read, mapping not-found to `None`.
    ///
    /// # Errors
    ///
    /// Returns cancellation or the wrapped client error.
    pub async fn lookup<T, Fut>(&self, action: &str, call: Fut) -> Result<Option<T>, DeployError>
    where
        Fut: Future<Output = Result<T, ClientError>>,
    {
        match race_cancel(self.cancel, action, call).await? {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(err) => Err(DeployError::provider(action, &err)),
        }
    }

    /// Runs a create, mapping a lost creation race to `None`.
    ///
    /// # Errors
    ///
    /// Returns cancellation or the wrapped client error.
    pub async fn submit<T, Fut>(&self, action: &str, call: Fut) -> Result<Option<T>, DeployError>
    where
        Fut: Future<Output = Result<T, ClientError>>,
    {
        match race_cancel(self.cancel, action, call).await? {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::AlreadyExists(message)) => {
                debug!(%action, %message, "resource appeared concurrently");
                Ok(None)
            }
            Err(err) => Err(DeployError::provider(action, &err)),
        }
    }

    /// Submits a delete and waits on its operation; a missing resource
    /// counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns cancellation, the wrapped client error, or the operation
    /// failure.
    pub async fn remove<Fut>(&self, action: &str, call: Fut) -> Result<(), DeployError>
    where
        Fut: Future<Output = Result<Operation, ClientError>>,
    {
        if let Some(operation) = self.lookup(action, call).await? {
            self.wait(action, operation).await?;
        }
        Ok(())
    }

    /// Submits a synchronous delete; a missing resource counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns cancellation or the wrapped client error.
    pub async fn remove_now<Fut>(&self, action: &str, call: Fut) -> Result<(), DeployError>
    where
        Fut: Future<Output = Result<(), ClientError>>,
    {
        self.lookup(action, call).await.map(|_| ())
    }
}
