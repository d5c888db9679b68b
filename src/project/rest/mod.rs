//! REST client for the project provider.
//!
//! One [`GcpRestClient`] implements every project-path client trait against
//! the public JSON APIs, authenticated with a bearer token. Responses are
//! classified by status into [`ClientError`] variants so the ensure layer
//! can treat not-found and lost creation races uniformly.

mod deployments;
mod resources;
mod wire;

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, ClientFuture, DeployError};

use super::operation::{Operation, OperationSource};

pub use wire::parse_operation;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the APIs the project provider talks to.
pub mod endpoints {
    /// Resource Manager (projects and project IAM).
    pub const RESOURCE_MANAGER: &str = "https://cloudresourcemanager.googleapis.com/v3";
    /// Service Usage (API enablement).
    pub const SERVICE_USAGE: &str = "https://serviceusage.googleapis.com/v1";
    /// IAM (service accounts).
    pub const IAM: &str = "https://iam.googleapis.com/v1";
    /// Compute Engine (networks, subnets, firewalls).
    pub const COMPUTE: &str = "https://compute.googleapis.com/compute/v1";
    /// Serverless VPC Access (connectors).
    pub const VPC_ACCESS: &str = "https://vpcaccess.googleapis.com/v1";
    /// Firestore admin.
    pub const FIRESTORE: &str = "https://firestore.googleapis.com/v1";
    /// Cloud KMS.
    pub const KMS: &str = "https://cloudkms.googleapis.com/v1";
    /// Pub/Sub.
    pub const PUBSUB: &str = "https://pubsub.googleapis.com/v1";
    /// Artifact Registry.
    pub const ARTIFACT_REGISTRY: &str = "https://artifactregistry.googleapis.com/v1";
    /// Cloud Run.
    pub const RUN: &str = "https://run.googleapis.com/v2";
    /// Cloud Scheduler.
    pub const SCHEDULER: &str = "https://cloudscheduler.googleapis.com/v1";
    /// Cloud Logging.
    pub const LOGGING: &str = "https://logging.googleapis.com/v2";
    /// Deployment Manager.
    pub const DEPLOYMENT_MANAGER: &str = "https://www.googleapis.com/deploymentmanager/v2";
}

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Bearer-token client for the project provider's REST APIs.
#[derive(Clone)]
pub struct GcpRestClient {
    http: reqwest::Client,
    token: String,
}

impl std::fmt::Debug for GcpRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpRestClient")
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl GcpRestClient {
    /// Creates a client authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Configuration`] when the token is blank.
    pub fn new(token: impl Into<String>) -> Result<Self, DeployError> {
        let raw: String = token.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DeployError::Configuration(String::from(
                "an access token is required for the gcp provider",
            )));
        }
        Ok(Self {
            http: HTTP_CLIENT.clone(),
            token: trimmed.to_owned(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, %url, "gcp request");
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(classify(status, &body))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let body = self.send(self.request(Method::GET, url)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_json<B, T>(&self, method: Method, url: &str, payload: &B) -> Result<T, ClientError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let body = self
            .send(self.request(method, url).json(payload))
            .await?;
        if body.is_empty() {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn delete(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        self.send(self.request(Method::DELETE, url)).await
    }

    /// Sends a request whose response is a long-running operation. `api`
    /// is the base URL used to refresh operations that carry no self link.
    async fn operation<B>(
        &self,
        method: Method,
        url: &str,
        payload: Option<&B>,
        api: &str,
    ) -> Result<Operation, ClientError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let builder = self.request(method, url);
        let body = match payload {
            Some(value) => self.send(builder.json(value)).await?,
            None => self.send(builder).await?,
        };
        parse_operation(api, &body)
    }
}

/// Maps an unsuccessful response onto a [`ClientError`].
#[must_use]
pub fn classify(status: StatusCode, body: &[u8]) -> ClientError {
    let message = wire::error_message(body).unwrap_or_else(|| {
        let text = String::from_utf8_lossy(body).trim().to_owned();
        if text.is_empty() {
            status.to_string()
        } else {
            text
        }
    });
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::FORBIDDEN => ClientError::PermissionDenied(message),
        StatusCode::CONFLICT => ClientError::AlreadyExists(message),
        other => ClientError::Api {
            status: other.as_u16(),
            message,
        },
    }
}

impl OperationSource for GcpRestClient {
    fn refresh_operation<'a>(&'a self, operation: &'a Operation) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            if operation.poll_url.is_empty() {
                return Ok(operation.clone());
            }
            let body = self
                .send(self.request(Method::GET, &operation.poll_url))
                .await?;
            let mut refreshed = wire::parse_operation_at(&operation.poll_url, &body)?;
            if refreshed.name.is_empty() {
                refreshed.name.clone_from(&operation.name);
            }
            Ok(refreshed)
        })
    }
}

#[cfg(test)]
mod tests;
