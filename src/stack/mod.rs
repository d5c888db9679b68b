//! Templated-stack provider.
//!
//! A deploy resolves the template, decides between create and update from a
//! status lookup, submits the stack, optionally polls it to a terminal state
//! and flattens the declared outputs. A destroy deletes the stack and
//! optionally polls until it is gone.

pub mod aws;
pub mod client;
pub mod status;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deployer::{
    DeployFuture, DeployOptions, DeployResult, DeployStatus, Deployer, DestroyOptions,
    DestroyResult, OperationType, Provider,
};
use crate::error::{ClientError, DeployError};
use crate::params::parse_parameters;
use crate::poller::{PollOutcome, PollPolicy, guarded, poll_until, race_cancel};
use crate::template::TemplateResolver;

use client::{StackClient, StackDescription, StackRequest};
use status::Terminal;

pub use client::{StackEvent, StackOutput};
pub use status::StackStatus;

const MISSING_STACK_PHRASE: &str = "does not exist";
const NO_UPDATES_PHRASE: &str = "No updates are to be performed";

/// Deployer for the templated-stack provider.
pub struct StackDeployer<C> {
    client: C,
    region: String,
    resolver: Arc<dyn TemplateResolver>,
    policy: PollPolicy,
}

impl<C: StackClient> StackDeployer<C> {
    /// Creates a deployer bound to `region`.
    #[must_use]
    pub fn new(client: C, region: impl Into<String>, resolver: Arc<dyn TemplateResolver>) -> Self {
        Self {
            client,
            region: region.into(),
            resolver,
            policy: PollPolicy::STACK,
        }
    }

    /// Overrides the poll interval and timeout.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Borrow the underlying client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    fn ensure_region(&self, requested: Option<&str>) -> Result<(), DeployError> {
        match requested {
            Some(region) if region != self.region => Err(DeployError::Validation(format!(
                "stack deployer is bound to region {} but {region} was requested",
                self.region
            ))),
            _ => Ok(()),
        }
    }

    async fn lookup(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Option<StackDescription>, DeployError> {
        let action = format!("describe stack {name}");
        match race_cancel(cancel, &action, self.client.describe_stack(name)).await? {
            Ok(description) => Ok(Some(description)),
            Err(err) if is_missing(&err) => Ok(None),
            Err(err) => Err(DeployError::provider(&action, &err)),
        }
    }

    async fn run_deploy(
        &self,
        cancel: &CancellationToken,
        options: &DeployOptions,
    ) -> Result<DeployResult, DeployError> {
        self.ensure_region(options.region.as_deref())?;
        let parameters = parse_parameters(&options.parameters)?;
        let template = self.resolver.resolve(
            Provider::Aws,
            options.template.as_deref(),
            &options.version,
            &self.region,
        )?;
        let request = StackRequest::new(&options.name, template, parameters);

        let existing = self.lookup(cancel, &options.name).await?;
        let exists = existing.is_some();
        let operation = if exists {
            OperationType::Update
        } else {
            OperationType::Create
        };
        info!(stack = %options.name, %operation, "submitting stack");

        if exists {
            let action = format!("update stack {}", options.name);
            match race_cancel(cancel, &action, self.client.update_stack(&request)).await? {
                Ok(stack_id) => debug!(stack = %options.name, %stack_id, "update submitted"),
                Err(err) if err.message().contains(NO_UPDATES_PHRASE) => {
                    info!(stack = %options.name, "stack already up to date");
                    return Ok(DeployResult {
                        name: options.name.clone(),
                        operation,
                        status: DeployStatus::NoChanges,
                        outputs: existing.as_ref().map(flatten_outputs).unwrap_or_default(),
                        no_changes: true,
                    });
                }
                Err(err) => return Err(DeployError::provider(&action, &err)),
            }
        } else {
            let stack_id = guarded(
                cancel,
                &format!("create stack {}", options.name),
                self.client.create_stack(&request),
            )
            .await?;
            debug!(stack = %options.name, %stack_id, "create submitted");
        }

        if !options.wait {
            return Ok(DeployResult {
                name: options.name.clone(),
                operation,
                status: DeployStatus::InProgress,
                outputs: BTreeMap::new(),
                no_changes: false,
            });
        }

        let description = self.wait_for_stack(cancel, &options.name, operation).await?;
        let status = match operation {
            OperationType::Create => DeployStatus::CreateComplete,
            OperationType::Update => DeployStatus::UpdateComplete,
        };
        Ok(DeployResult {
            name: options.name.clone(),
            operation,
            status,
            outputs: flatten_outputs(&description),
            no_changes: false,
        })
    }

    async fn wait_for_stack(
        &self,
        cancel: &CancellationToken,
        name: &str,
        operation: OperationType,
    ) -> Result<StackDescription, DeployError> {
        let label = format!("stack {name} {operation}");
        let waited = poll_until(cancel, self.policy, &label, move || async move {
            let description =
                guarded(cancel, &format!("describe stack {name}"), self.client.describe_stack(name))
                    .await?;
            Ok(match description.status.terminal() {
                Terminal::Pending => PollOutcome::Pending,
                Terminal::Success => PollOutcome::Succeeded(description),
                Terminal::Failure => PollOutcome::Failed(vec![format!(
                    "stack entered {}{}",
                    description.status,
                    description
                        .status_reason
                        .as_deref()
                        .map_or_else(String::new, |reason| format!(": {reason}"))
                )]),
            })
        })
        .await;
        self.enrich_failure(cancel, name, waited).await
    }

    async fn enrich_failure<T>(
        &self,
        cancel: &CancellationToken,
        name: &str,
        result: Result<T, DeployError>,
    ) -> Result<T, DeployError> {
        let (operation, message) = match result {
            Err(DeployError::OperationFailed { operation, message }) => (operation, message),
            other => return other,
        };
        let events = match race_cancel(cancel, "list stack events", self.client.stack_events(name))
            .await
        {
            Ok(Ok(events)) => events,
            Ok(Err(err)) => {
                warn!(stack = %name, error = %err, "could not collect stack failure events");
                Vec::new()
            }
            Err(cancelled) => return Err(cancelled),
        };
        let details = failure_details(&events);
        let enriched = if details.is_empty() {
            message
        } else {
            format!("{message}; {details}")
        };
        Err(DeployError::OperationFailed {
            operation,
            message: enriched,
        })
    }

    async fn run_destroy(
        &self,
        cancel: &CancellationToken,
        options: &DestroyOptions,
    ) -> Result<DestroyResult, DeployError> {
        self.ensure_region(options.region.as_deref())?;
        if self.lookup(cancel, &options.name).await?.is_none() {
            info!(stack = %options.name, "stack absent; nothing to destroy");
            return Ok(DestroyResult::not_found(&options.name));
        }

        guarded(
            cancel,
            &format!("delete stack {}", options.name),
            self.client.delete_stack(&options.name),
        )
        .await?;
        info!(stack = %options.name, "delete submitted");

        if !options.wait {
            return Ok(DestroyResult {
                name: options.name.clone(),
                status: DeployStatus::InProgress,
                not_found: false,
            });
        }

        let label = format!("stack {} DELETE", options.name);
        let waited = poll_until(cancel, self.policy, &label, move || async move {
            let action = format!("describe stack {}", options.name);
            match race_cancel(cancel, &action, self.client.describe_stack(&options.name)).await? {
                Err(err) if is_missing(&err) => Ok(PollOutcome::Succeeded(())),
                Err(err) => Err(DeployError::provider(&action, &err)),
                Ok(description) => Ok(match description.status.terminal() {
                    Terminal::Success if description.status == StackStatus::DeleteComplete => {
                        PollOutcome::Succeeded(())
                    }
                    Terminal::Failure => PollOutcome::Failed(vec![format!(
                        "stack entered {}",
                        description.status
                    )]),
                    Terminal::Success | Terminal::Pending => PollOutcome::Pending,
                }),
            }
        })
        .await;
        self.enrich_failure(cancel, &options.name, waited).await?;

        Ok(DestroyResult {
            name: options.name.clone(),
            status: DeployStatus::DeleteComplete,
            not_found: false,
        })
    }

    async fn run_outputs(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<BTreeMap<String, String>, DeployError> {
        let description = self
            .lookup(cancel, name)
            .await?
            .ok_or_else(|| DeployError::NotFound {
                what: format!("stack {name}"),
            })?;
        Ok(flatten_outputs(&description))
    }
}

impl<C: StackClient> Deployer for StackDeployer<C> {
    fn deploy<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        options: &'a DeployOptions,
    ) -> DeployFuture<'a, DeployResult> {
        Box::pin(self.run_deploy(cancel, options))
    }

    fn destroy<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        options: &'a DestroyOptions,
    ) -> DeployFuture<'a, DestroyResult> {
        Box::pin(self.run_destroy(cancel, options))
    }

    fn check_exists<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> DeployFuture<'a, bool> {
        Box::pin(async move { Ok(self.lookup(cancel, name).await?.is_some()) })
    }

    fn outputs<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> DeployFuture<'a, BTreeMap<String, String>> {
        Box::pin(self.run_outputs(cancel, name))
    }

    fn region(&self) -> &str {
        &self.region
    }
}

fn is_missing(err: &ClientError) -> bool {
    matches!(err, ClientError::NotFound(_)) || err.message().contains(MISSING_STACK_PHRASE)
}

fn flatten_outputs(description: &StackDescription) -> BTreeMap<String, String> {
    description
        .outputs
        .iter()
        .map(|output| (output.key.clone(), output.value.clone()))
        .collect()
}

/// Renders failed sub-resource events as `name (type): reason`.
#[must_use]
pub fn failure_details(events: &[StackEvent]) -> String {
    events
        .iter()
        .filter(|event| event.is_failure())
        .map(|event| {
            format!(
                "{} ({}): {}",
                event.logical_id,
                event.resource_type,
                event.reason.as_deref().unwrap_or("no reason reported")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests;
