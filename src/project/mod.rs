//! Project plus resource graph provider.
//!
//! A deploy makes sure the project exists (creating it and enabling its
//! service APIs when absent), converges the ten resource domains inside it,
//! then records what was applied as a declarative deployment whose manifest
//! later serves [`Deployer::outputs`]. A destroy tears every domain down
//! best-effort, removes the record and deletes the project.

pub mod clients;
pub mod domain;
pub mod ensure;
pub mod lifecycle;
pub mod manifest;
pub mod operation;
pub mod orchestrator;
pub mod outputs;
pub mod resources;
pub mod rest;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deployer::{
    DeployFuture, DeployOptions, DeployResult, DeployStatus, Deployer, DestroyOptions,
    DestroyResult, OperationType, Provider,
};
use crate::error::{ClientError, DeployError, DomainFailure};
use crate::params::parse_parameters;
use crate::poller::{PollPolicy, guarded, race_cancel};
use crate::template::{TemplateResolver, TemplateSource};

use clients::{
    ComputeClient, DatastoreClient, DeploymentClient, IdentityClient, KeyManagementClient,
    LoggingClient, MessagingClient, NetworkClient, ProjectClient, RegistryClient,
    ResourceClients, SchedulerClient,
};
use lifecycle::ProjectLifecycle;
use manifest::{BUILTIN_TEMPLATE, DEPLOYMENT_NAME, RecordProperties, record_spec, render_config};
use operation::{OperationSource, wait_for_operation};
use resources::ResourceConfig;

pub use domain::Domain;
pub use orchestrator::ConvergeReport;
pub use resources::BackendResources;

/// Everything the project provider needs from one cloud client.
pub trait ProjectApi:
    ProjectClient
    + DeploymentClient
    + OperationSource
    + IdentityClient
    + NetworkClient
    + DatastoreClient
    + KeyManagementClient
    + MessagingClient
    + RegistryClient
    + ComputeClient
    + SchedulerClient
    + LoggingClient
    + 'static
{
}

impl<T> ProjectApi for T where
    T: ProjectClient
        + DeploymentClient
        + OperationSource
        + IdentityClient
        + NetworkClient
        + DatastoreClient
        + KeyManagementClient
        + MessagingClient
        + RegistryClient
        + ComputeClient
        + SchedulerClient
        + LoggingClient
        + 'static
{
}

/// Deployer for the project plus resource graph provider.
pub struct ProjectDeployer<C> {
    client: Arc<C>,
    clients: ResourceClients,
    region: String,
    resolver: Arc<dyn TemplateResolver>,
    allow_unauthenticated: bool,
    organization_id: Option<String>,
    resource_policy: PollPolicy,
    project_policy: PollPolicy,
}

impl<C: ProjectApi> ProjectDeployer<C> {
    /// Creates a deployer whose domain clients all share `client`.
    #[must_use]
    pub fn from_client(
        client: Arc<C>,
        region: impl Into<String>,
        resolver: Arc<dyn TemplateResolver>,
    ) -> Self {
        let clients = ResourceClients::from_shared(&client);
        Self {
            client,
            clients,
            region: region.into(),
            resolver,
            allow_unauthenticated: false,
            organization_id: None,
            resource_policy: PollPolicy::RESOURCE,
            project_policy: PollPolicy::PROJECT,
        }
    }

    /// Sets whether the control-plane service accepts unauthenticated calls.
    #[must_use]
    pub const fn with_allow_unauthenticated(mut self, allow: bool) -> Self {
        self.allow_unauthenticated = allow;
        self
    }

    /// Sets the organisation new projects are created under when the
    /// deploy options name none.
    #[must_use]
    pub fn with_organization_id(mut self, organization_id: Option<String>) -> Self {
        self.organization_id = organization_id;
        self
    }

    /// Overrides the per-resource and project-level poll policies.
    #[must_use]
    pub const fn with_poll_policy(mut self, resource: PollPolicy, project: PollPolicy) -> Self {
        self.resource_policy = resource;
        self.project_policy = project;
        self
    }

    /// Borrow the underlying client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    fn lifecycle(&self) -> ProjectLifecycle<'_> {
        ProjectLifecycle::new(
            self.client.as_ref(),
            self.client.as_ref(),
            self.project_policy,
        )
    }

    fn record_template(&self, options: &DeployOptions, region: &str) -> Result<String, DeployError> {
        let Some(locator) = options.template.as_deref() else {
            return Ok(BUILTIN_TEMPLATE.to_owned());
        };
        match self
            .resolver
            .resolve(Provider::Gcp, Some(locator), &options.version, region)?
        {
            TemplateSource::Body(body) => Ok(body),
            TemplateSource::Url(url) => Err(DeployError::Validation(format!(
                "project deployments need an inline or local template, got URL {url}"
            ))),
        }
    }

    async fn run_deploy(
        &self,
        cancel: &CancellationToken,
        options: &DeployOptions,
    ) -> Result<DeployResult, DeployError> {
        let project = options.name.as_str();
        let region = options.region.as_deref().unwrap_or(&self.region);
        let params = parse_parameters(&options.parameters)?;
        let config = ResourceConfig::new(project, region)
            .with_overrides(&params)?
            .with_allow_unauthenticated(self.allow_unauthenticated);
        let template = self.record_template(options, region)?;

        let lifecycle = self.lifecycle();
        let existed = lifecycle.exists(cancel, project).await?;
        if existed {
            info!(%project, "project exists; converging as UPDATE");
        } else {
            let organization = options
                .organization_id
                .as_deref()
                .or(self.organization_id.as_deref());
            lifecycle
                .create(cancel, project, organization, &config.labels, options.wait)
                .await?;
            if !options.wait {
                return Ok(DeployResult {
                    name: project.to_owned(),
                    operation: OperationType::Create,
                    status: DeployStatus::InProgress,
                    outputs: BTreeMap::new(),
                    no_changes: false,
                });
            }
        }
        // Enablement is idempotent and may be missing on a project created
        // without waiting or left behind by an interrupted run.
        lifecycle.enable_services(cancel, project).await?;

        let info = lifecycle.describe(cancel, project).await?;
        let report = orchestrator::converge(
            cancel,
            &self.clients,
            &config,
            &info,
            self.resource_policy,
        )
        .await?;
        let properties = RecordProperties::new(&config, &report.resources);
        let record_changed = self
            .apply_record(cancel, project, render_config(&properties)?, &template)
            .await?;
        let outputs = outputs::merge_outputs(properties.to_outputs(), &info);

        let (operation, status, no_changes) = if !existed {
            (OperationType::Create, DeployStatus::CreateComplete, false)
        } else if report.changes.is_empty() && !record_changed {
            (OperationType::Update, DeployStatus::NoChanges, true)
        } else {
            (OperationType::Update, DeployStatus::UpdateComplete, false)
        };
        info!(%project, %status, changes = report.changes.len(), record_changed, "deploy finished");
        Ok(DeployResult {
            name: project.to_owned(),
            operation,
            status,
            outputs,
            no_changes,
        })
    }

    /// Creates or updates the deployment record. Returns whether anything
    /// was submitted.
    async fn apply_record(
        &self,
        cancel: &CancellationToken,
        project: &str,
        config: String,
        template: &str,
    ) -> Result<bool, DeployError> {
        let get_action = format!("get deployment {DEPLOYMENT_NAME}");
        let existing =
            match race_cancel(cancel, &get_action, self.client.get_deployment(project, DEPLOYMENT_NAME))
                .await?
            {
                Ok(deployment) => Some(deployment),
                Err(ClientError::NotFound(_)) => None,
                Err(err) => return Err(DeployError::provider(&get_action, &err)),
            };

        let Some(deployment) = existing else {
            let spec = record_spec(config, template);
            let action = format!("insert deployment {DEPLOYMENT_NAME}");
            let operation =
                guarded(cancel, &action, self.client.insert_deployment(project, &spec)).await?;
            self.wait_resource(cancel, &action, operation).await?;
            info!(%project, "deployment record created");
            return Ok(true);
        };

        if let Some(manifest_name) = deployment
            .manifest
            .as_deref()
            .and_then(|reference| reference.rsplit('/').next())
            .filter(|name| !name.is_empty())
        {
            let applied = guarded(
                cancel,
                &format!("get manifest {manifest_name}"),
                self.client
                    .get_manifest(project, DEPLOYMENT_NAME, manifest_name),
            )
            .await?;
            if applied.config == config {
                return Ok(false);
            }
        }

        let spec = record_spec(config, template);
        let action = format!("update deployment {DEPLOYMENT_NAME}");
        let operation = guarded(
            cancel,
            &action,
            self.client
                .update_deployment(project, &spec, &deployment.fingerprint),
        )
        .await?;
        self.wait_resource(cancel, &action, operation).await?;
        info!(%project, "deployment record updated");
        Ok(true)
    }

    async fn wait_resource(
        &self,
        cancel: &CancellationToken,
        label: &str,
        operation: operation::Operation,
    ) -> Result<(), DeployError> {
        wait_for_operation(
            cancel,
            self.client.as_ref(),
            self.resource_policy,
            label,
            operation,
        )
        .await
        .map(|_| ())
    }

    async fn remove_record(
        &self,
        cancel: &CancellationToken,
        project: &str,
    ) -> Result<(), DeployError> {
        let action = format!("delete deployment {DEPLOYMENT_NAME}");
        match race_cancel(
            cancel,
            &action,
            self.client.delete_deployment(project, DEPLOYMENT_NAME),
        )
        .await?
        {
            Ok(operation) => self.wait_resource(cancel, &action, operation).await,
            Err(ClientError::NotFound(_)) => Ok(()),
            Err(err) => Err(DeployError::provider(&action, &err)),
        }
    }

    async fn run_destroy(
        &self,
        cancel: &CancellationToken,
        options: &DestroyOptions,
    ) -> Result<DestroyResult, DeployError> {
        let project = options.name.as_str();
        let lifecycle = self.lifecycle();
        if !lifecycle.exists(cancel, project).await? {
            info!(%project, "project absent; nothing to destroy");
            return Ok(DestroyResult::not_found(project));
        }

        let region = options.region.as_deref().unwrap_or(&self.region);
        let config = ResourceConfig::new(project, region);
        let mut failures =
            orchestrator::teardown(cancel, &self.clients, &config, self.resource_policy).await?;

        if let Err(error) = self.remove_record(cancel, project).await {
            if error.is_cancelled() {
                return Err(error);
            }
            warn!(%project, %error, "could not remove deployment record");
            failures.push(DomainFailure {
                domain: Domain::DeploymentRecord,
                error,
            });
        }

        let status = match lifecycle.delete(cancel, project, options.wait).await {
            Ok(_) if options.wait => DeployStatus::DeleteComplete,
            Ok(_) => DeployStatus::InProgress,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                warn!(%project, %error, "could not delete project");
                failures.push(DomainFailure {
                    domain: Domain::Project,
                    error,
                });
                DeployStatus::InProgress
            }
        };

        if !failures.is_empty() {
            return Err(DeployError::Teardown { failures });
        }
        Ok(DestroyResult {
            name: project.to_owned(),
            status,
            not_found: false,
        })
    }

    async fn run_outputs(
        &self,
        cancel: &CancellationToken,
        project: &str,
    ) -> Result<BTreeMap<String, String>, DeployError> {
        let info = self.lifecycle().describe(cancel, project).await?;
        let recorded =
            outputs::read_record_outputs(cancel, self.client.as_ref(), project).await?;
        Ok(outputs::merge_outputs(recorded, &info))
    }
}

impl<C: ProjectApi> Deployer for ProjectDeployer<C> {
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
        Box::pin(async move { self.lifecycle().exists(cancel, name).await })
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

#[cfg(test)]
mod tests;
