//! Projects, service enablement and deployment records.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::Serialize;

use crate::error::ClientFuture;
use crate::project::clients::{
    Deployment, DeploymentClient, DeploymentSpec, Manifest, ProjectClient, ProjectInfo,
};
use crate::project::operation::Operation;

use super::GcpRestClient;
use super::endpoints::{DEPLOYMENT_MANAGER, RESOURCE_MANAGER, SERVICE_USAGE};
use super::wire::{DeploymentWire, ManifestWire, ProjectWire};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest<'a> {
    project_id: &'a str,
    display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
    labels: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEnableRequest<'a> {
    service_ids: &'a [String],
}

#[derive(Serialize)]
struct ImportFile<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ConfigFile<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct Target<'a> {
    config: ConfigFile<'a>,
    imports: Vec<ImportFile<'a>>,
}

#[derive(Serialize)]
struct DeploymentRequest<'a> {
    name: &'a str,
    target: Target<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<&'a str>,
}

impl<'a> DeploymentRequest<'a> {
    fn new(spec: &'a DeploymentSpec, fingerprint: Option<&'a str>) -> Self {
        Self {
            name: &spec.name,
            target: Target {
                config: ConfigFile {
                    content: &spec.config,
                },
                imports: spec
                    .imports
                    .iter()
                    .map(|(name, content)| ImportFile { name, content })
                    .collect(),
            },
            fingerprint,
        }
    }
}

fn deployments_url(project: &str) -> String {
    format!("{DEPLOYMENT_MANAGER}/projects/{project}/global/deployments")
}

impl ProjectClient for GcpRestClient {
    fn get_project<'a>(&'a self, project: &'a str) -> ClientFuture<'a, ProjectInfo> {
        Box::pin(async move {
            let wire: ProjectWire = self
                .get_json(&format!("{RESOURCE_MANAGER}/projects/{project}"))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_project<'a>(
        &'a self,
        project: &'a str,
        parent: Option<&'a str>,
        labels: &'a BTreeMap<String, String>,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            let payload = CreateProjectRequest {
                project_id: project,
                display_name: project,
                parent,
                labels,
            };
            self.operation(
                Method::POST,
                &format!("{RESOURCE_MANAGER}/projects"),
                Some(&payload),
                RESOURCE_MANAGER,
            )
            .await
        })
    }

    fn delete_project<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{RESOURCE_MANAGER}/projects/{project}"),
                None,
                RESOURCE_MANAGER,
            )
            .await
        })
    }

    fn enable_services<'a>(
        &'a self,
        project: &'a str,
        services: &'a [String],
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!("{SERVICE_USAGE}/projects/{project}/services:batchEnable"),
                Some(&BatchEnableRequest {
                    service_ids: services,
                }),
                SERVICE_USAGE,
            )
            .await
        })
    }
}

impl DeploymentClient for GcpRestClient {
    fn get_deployment<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Deployment> {
        Box::pin(async move {
            let wire: DeploymentWire = self
                .get_json(&format!("{}/{name}", deployments_url(project)))
                .await?;
            Ok(wire.into())
        })
    }

    fn insert_deployment<'a>(
        &'a self,
        project: &'a str,
        spec: &'a DeploymentSpec,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &deployments_url(project),
                Some(&DeploymentRequest::new(spec, None)),
                DEPLOYMENT_MANAGER,
            )
            .await
        })
    }

    fn update_deployment<'a>(
        &'a self,
        project: &'a str,
        spec: &'a DeploymentSpec,
        fingerprint: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::PUT,
                &format!("{}/{}", deployments_url(project), spec.name),
                Some(&DeploymentRequest::new(spec, Some(fingerprint))),
                DEPLOYMENT_MANAGER,
            )
            .await
        })
    }

    fn delete_deployment<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{}/{name}", deployments_url(project)),
                None,
                DEPLOYMENT_MANAGER,
            )
            .await
        })
    }

    fn get_manifest<'a>(
        &'a self,
        project: &'a str,
        deployment: &'a str,
        manifest: &'a str,
    ) -> ClientFuture<'a, Manifest> {
        Box::pin(async move {
            let wire: ManifestWire = self
                .get_json(&format!(
                    "{}/{deployment}/manifests/{manifest}",
                    deployments_url(project)
                ))
                .await?;
            Ok(wire.into())
        })
    }
}
