//! Project lifecycle manager.
//!
//! Projects move `absent -> creating -> ready` and `ready -> deleting ->
//! absent`. Creation is confirmed twice: once by its operation and again by
//! re-polling existence, because a finished create is not immediately
//! visible to reads. Deletion trusts its operation alone.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{ClientError, DeployError};
use crate::poller::{PollOutcome, PollPolicy, guarded, poll_until, race_cancel};

use super::clients::{ProjectClient, ProjectInfo};
use super::operation::{OperationSource, wait_for_operation};

const MAY_NOT_EXIST_PHRASE: &str = "may not exist";

/// Service APIs enabled on every new project.
pub const REQUIRED_SERVICES: [&str; 13] = [
    "iam.googleapis.com",
    "compute.googleapis.com",
    "vpcaccess.googleapis.com",
    "firestore.googleapis.com",
    "cloudkms.googleapis.com",
    "pubsub.googleapis.com",
    "artifactregistry.googleapis.com",
    "run.googleapis.com",
    "cloudscheduler.googleapis.com",
    "logging.googleapis.com",
    "deploymentmanager.googleapis.com",
    "serviceusage.googleapis.com",
    "cloudresourcemanager.googleapis.com",
];

/// Observable state of a project.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProjectState {
    /// No project with the id is visible.
    Absent,
    /// Creation was submitted and not waited on.
    Creating,
    /// The project is visible and active.
    Ready,
    /// Deletion was submitted and not waited on.
    Deleting,
}

/// Drives project existence, creation, deletion and API enablement.
pub struct ProjectLifecycle<'c> {
    projects: &'c dyn ProjectClient,
    operations: &'c dyn OperationSource,
    policy: PollPolicy,
}

impl<'c> ProjectLifecycle<'c> {
    /// Creates a manager over the given clients.
    #[must_use]
    pub const fn new(
        projects: &'c dyn ProjectClient,
        operations: &'c dyn OperationSource,
        policy: PollPolicy,
    ) -> Self {
        Self {
            projects,
            operations,
            policy,
        }
    }

    /// Reports whether the project exists. Not-found and "permission
    /// denied, may not exist" both mean `false`.
    ///
    /// # Errors
    ///
    /// Returns cancellation or any other lookup failure.
    pub async fn exists(
        &self,
        cancel: &CancellationToken,
        project: &str,
    ) -> Result<bool, DeployError> {
        Ok(self.describe_if_present(cancel, project).await?.is_some())
    }

    /// Reads project metadata, mapping absence to `None`.
    ///
    /// # Errors
    ///
    /// Returns cancellation or any other lookup failure.
    pub async fn describe_if_present(
        &self,
        cancel: &CancellationToken,
        project: &str,
    ) -> Result<Option<ProjectInfo>, DeployError> {
        let action = format!("get project {project}");
        match race_cancel(cancel, &action, self.projects.get_project(project)).await? {
            Ok(info) => Ok(Some(info)),
            Err(err) if is_absent(&err) => Ok(None),
            Err(err) => Err(DeployError::provider(&action, &err)),
        }
    }

    /// Reads project metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::NotFound`] when the project is absent.
    pub async fn describe(
        &self,
        cancel: &CancellationToken,
        project: &str,
    ) -> Result<ProjectInfo, DeployError> {
        self.describe_if_present(cancel, project)
            .await?
            .ok_or_else(|| DeployError::NotFound {
                what: format!("project {project}"),
            })
    }

    /// Submits project creation. With `wait` the call blocks until the
    /// creation operation finishes and the project is readable.
    ///
    /// # Errors
    ///
    /// Returns submission, operation, timeout or cancellation failures.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project: &str,
        organization_id: Option<&str>,
        labels: &BTreeMap<String, String>,
        wait: bool,
    ) -> Result<ProjectState, DeployError> {
        let parent = organization_id.map(|id| {
            if id.starts_with("organizations/") {
                id.to_owned()
            } else {
                format!("organizations/{id}")
            }
        });
        let action = format!("create project {project}");
        let operation = guarded(
            cancel,
            &action,
            self.projects
                .create_project(project, parent.as_deref(), labels),
        )
        .await?;
        info!(%project, parent = ?parent, "project creation submitted");
        if !wait {
            return Ok(ProjectState::Creating);
        }

        wait_for_operation(cancel, self.operations, self.policy, &action, operation).await?;
        poll_until(
            cancel,
            self.policy,
            &format!("project {project} visibility"),
            move || async move {
                Ok(if self.exists(cancel, project).await? {
                    PollOutcome::Succeeded(())
                } else {
                    PollOutcome::Pending
                })
            },
        )
        .await?;
        info!(%project, "project ready");
        Ok(ProjectState::Ready)
    }

    /// Enables the service APIs every domain depends on.
    ///
    /// # Errors
    ///
    /// Returns submission, operation, timeout or cancellation failures.
    pub async fn enable_services(
        &self,
        cancel: &CancellationToken,
        project: &str,
    ) -> Result<(), DeployError> {
        let services: Vec<String> = REQUIRED_SERVICES.iter().map(|s| (*s).to_owned()).collect();
        let action = format!("enable services on {project}");
        let operation = guarded(
            cancel,
            &action,
            self.projects.enable_services(project, &services),
        )
        .await?;
        wait_for_operation(cancel, self.operations, self.policy, &action, operation).await?;
        info!(%project, count = services.len(), "service APIs enabled");
        Ok(())
    }

    /// Submits project deletion, optionally waiting on its operation.
    ///
    /// # Errors
    ///
    /// Returns submission, operation, timeout or cancellation failures.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        project: &str,
        wait: bool,
    ) -> Result<ProjectState, DeployError> {
        let action = format!("delete project {project}");
        let operation = guarded(cancel, &action, self.projects.delete_project(project)).await?;
        info!(%project, "project deletion submitted");
        if !wait {
            return Ok(ProjectState::Deleting);
        }
        wait_for_operation(cancel, self.operations, self.policy, &action, operation).await?;
        Ok(ProjectState::Absent)
    }
}

fn is_absent(err: &ClientError) -> bool {
    match err {
        ClientError::NotFound(_) => true,
        ClientError::PermissionDenied(message) => message.contains(MAY_NOT_EXIST_PHRASE),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClientError::NotFound(String::from("projects/p")), true)]
    #[case(
        ClientError::PermissionDenied(String::from(
            "The caller does not have permission, or the project may not exist"
        )),
        true
    )]
    #[case(ClientError::PermissionDenied(String::from("billing disabled")), false)]
    #[case(ClientError::Api { status: 500, message: String::from("may not exist") }, false)]
    fn classifies_absence(#[case] err: ClientError, #[case] expected: bool) {
        assert_eq!(is_absent(&err), expected);
    }
}
