//! JSON shapes exchanged with the REST APIs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;
use crate::project::clients::{
    Connector, CryptoKey, Database, Deployment, IamBinding, IamPolicy, IndexSpec, KeyRing,
    LogSink, Manifest, Network, ProjectInfo, Repository, SchedulerJob, Service, ServiceAccount,
    Subnet, Subscription, Topic,
};
use crate::project::operation::Operation;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Extracts `error.message` from an error response body.
pub(super) fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationWire {
    #[serde(default)]
    name: String,
    done: Option<bool>,
    status: Option<String>,
    self_link: Option<String>,
    error: Option<Value>,
}

fn operation_errors(error: Option<&Value>) -> Vec<String> {
    let Some(error) = error else {
        return Vec::new();
    };
    if let Some(items) = error.get("errors").and_then(Value::as_array) {
        let messages: Vec<String> = items
            .iter()
            .filter_map(|item| item.get("message").and_then(Value::as_str))
            .map(str::to_owned)
            .collect();
        if !messages.is_empty() {
            return messages;
        }
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| error.to_string(), str::to_owned);
    vec![message]
}

fn into_operation(wire: OperationWire, poll_url: String) -> Operation {
    let done = wire.done.unwrap_or(false)
        || wire.status.as_deref().is_some_and(|status| status == "DONE");
    Operation {
        errors: operation_errors(wire.error.as_ref()),
        name: wire.name,
        poll_url,
        done,
    }
}

/// Parses a long-running operation from either the compute style
/// (`status: DONE` plus `selfLink`) or the `google.longrunning` style
/// (`done: true`). Operations without a self link refresh through
/// `<api>/<name>`.
///
/// # Errors
///
/// Returns [`ClientError::Decode`] when the body is not an operation.
pub fn parse_operation(api: &str, body: &[u8]) -> Result<Operation, ClientError> {
    let wire: OperationWire = serde_json::from_slice(body)?;
    let poll_url = match wire.self_link.as_deref() {
        Some(link) if !link.is_empty() => link.to_owned(),
        _ if wire.name.is_empty() => String::new(),
        _ => format!("{api}/{}", wire.name),
    };
    Ok(into_operation(wire, poll_url))
}

/// Parses a refreshed operation, keeping the URL it was fetched from.
pub(super) fn parse_operation_at(poll_url: &str, body: &[u8]) -> Result<Operation, ClientError> {
    let wire: OperationWire = serde_json::from_slice(body)?;
    Ok(into_operation(wire, poll_url.to_owned()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProjectWire {
    name: String,
    project_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    state: String,
}

impl From<ProjectWire> for ProjectInfo {
    fn from(value: ProjectWire) -> Self {
        let number = value
            .name
            .strip_prefix("projects/")
            .unwrap_or(&value.name)
            .to_owned();
        Self {
            display_name: if value.display_name.is_empty() {
                value.project_id.clone()
            } else {
                value.display_name
            },
            project_id: value.project_id,
            number,
            state: value.state,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ServiceAccountWire {
    email: String,
    name: String,
    #[serde(default)]
    unique_id: String,
}

impl From<ServiceAccountWire> for ServiceAccount {
    fn from(value: ServiceAccountWire) -> Self {
        Self {
            email: value.email,
            name: value.name,
            unique_id: value.unique_id,
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
pub(super) struct BindingWire {
    role: String,
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Default, Deserialize, Serialize)]
pub(super) struct PolicyWire {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bindings: Vec<BindingWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

impl From<PolicyWire> for IamPolicy {
    fn from(value: PolicyWire) -> Self {
        Self {
            bindings: value
                .bindings
                .into_iter()
                .map(|binding| IamBinding {
                    role: binding.role,
                    members: binding.members,
                })
                .collect(),
            etag: value.etag,
        }
    }
}

impl From<&IamPolicy> for PolicyWire {
    fn from(value: &IamPolicy) -> Self {
        Self {
            bindings: value
                .bindings
                .iter()
                .map(|binding| BindingWire {
                    role: binding.role.clone(),
                    members: binding.members.clone(),
                })
                .collect(),
            etag: value.etag.clone(),
        }
    }
}

/// Body of a `setIamPolicy` call.
#[derive(Serialize)]
pub(super) struct SetPolicyRequest {
    policy: PolicyWire,
}

impl SetPolicyRequest {
    pub(super) fn new(policy: &IamPolicy) -> Self {
        Self {
            policy: PolicyWire::from(policy),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NetworkWire {
    name: String,
    #[serde(default)]
    self_link: String,
}

impl From<NetworkWire> for Network {
    fn from(value: NetworkWire) -> Self {
        Self {
            name: value.name,
            self_link: value.self_link,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubnetWire {
    name: String,
    #[serde(default)]
    self_link: String,
    #[serde(default)]
    ip_cidr_range: String,
}

impl From<SubnetWire> for Subnet {
    fn from(value: SubnetWire) -> Self {
        Self {
            name: value.name,
            self_link: value.self_link,
            cidr: value.ip_cidr_range,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct NamedWire {
    name: String,
}

impl NamedWire {
    pub(super) fn into_name(self) -> String {
        self.name
    }
}

impl From<NamedWire> for KeyRing {
    fn from(value: NamedWire) -> Self {
        Self { name: value.name }
    }
}

impl From<NamedWire> for CryptoKey {
    fn from(value: NamedWire) -> Self {
        Self { name: value.name }
    }
}

impl From<NamedWire> for Topic {
    fn from(value: NamedWire) -> Self {
        Self { name: value.name }
    }
}

impl From<NamedWire> for Repository {
    fn from(value: NamedWire) -> Self {
        Self { name: value.name }
    }
}

#[derive(Deserialize)]
pub(super) struct ConnectorWire {
    name: String,
    #[serde(default)]
    state: String,
}

impl From<ConnectorWire> for Connector {
    fn from(value: ConnectorWire) -> Self {
        Self {
            name: value.name,
            state: value.state,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DatabaseWire {
    name: String,
    #[serde(default)]
    location_id: String,
}

impl From<DatabaseWire> for Database {
    fn from(value: DatabaseWire) -> Self {
        Self {
            name: value.name,
            location: value.location_id,
        }
    }
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct IndexFieldWire {
    field_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct IndexWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fields: Vec<IndexFieldWire>,
}

#[derive(Default, Deserialize)]
pub(super) struct IndexListWire {
    #[serde(default)]
    pub(super) indexes: Vec<IndexWire>,
}

impl IndexWire {
    /// Converts a listed index, dropping the implicit `__name__` field.
    /// Returns `None` when the name carries no collection group.
    pub(super) fn into_spec(self) -> Option<IndexSpec> {
        let collection = self
            .name
            .split('/')
            .skip_while(|segment| *segment != "collectionGroups")
            .nth(1)?
            .to_owned();
        Some(IndexSpec {
            collection,
            fields: self
                .fields
                .into_iter()
                .map(|field| field.field_path)
                .filter(|path| path != "__name__")
                .collect(),
        })
    }
}

/// Body of a composite-index creation.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateIndexRequest {
    query_scope: &'static str,
    fields: Vec<IndexFieldWire>,
}

impl CreateIndexRequest {
    pub(super) fn new(index: &IndexSpec) -> Self {
        Self {
            query_scope: "COLLECTION",
            fields: index
                .fields
                .iter()
                .map(|path| IndexFieldWire {
                    field_path: path.clone(),
                    order: Some(String::from("ASCENDING")),
                })
                .collect(),
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct KeyVersionListWire {
    #[serde(default)]
    pub(super) crypto_key_versions: Vec<NamedWire>,
    #[serde(default)]
    pub(super) next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubscriptionWire {
    name: String,
    topic: String,
    #[serde(default)]
    push_config: Option<PushConfigWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushConfigWire {
    #[serde(default)]
    push_endpoint: String,
}

impl From<SubscriptionWire> for Subscription {
    fn from(value: SubscriptionWire) -> Self {
        Self {
            name: value.name,
            topic: value.topic,
            push_endpoint: value
                .push_config
                .map(|config| config.push_endpoint)
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ServiceWire {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    template: Option<RevisionTemplateWire>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionTemplateWire {
    #[serde(default)]
    containers: Vec<ContainerWire>,
    #[serde(default)]
    scaling: Option<ScalingWire>,
    #[serde(default)]
    timeout: Option<String>,
    #[serde(default)]
    service_account: String,
    #[serde(default)]
    vpc_access: Option<VpcAccessWire>,
}

#[derive(Deserialize)]
struct ContainerWire {
    #[serde(default)]
    image: String,
    #[serde(default)]
    env: Vec<EnvVarWire>,
}

#[derive(Deserialize)]
struct EnvVarWire {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct VpcAccessWire {
    #[serde(default)]
    connector: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingWire {
    #[serde(default)]
    min_instance_count: u32,
    #[serde(default)]
    max_instance_count: u32,
}

/// Reads a protobuf duration such as `"300s"` as whole seconds.
fn duration_secs(raw: &str) -> u32 {
    raw.strip_suffix('s')
        .and_then(|secs| secs.split('.').next())
        .and_then(|secs| secs.parse().ok())
        .unwrap_or_default()
}

impl From<ServiceWire> for Service {
    fn from(value: ServiceWire) -> Self {
        let template = value.template.unwrap_or_default();
        let scaling = template.scaling.unwrap_or_default();
        let (image, env) = template
            .containers
            .into_iter()
            .next()
            .map(|container| {
                let env: BTreeMap<String, String> = container
                    .env
                    .into_iter()
                    .map(|var| (var.name, var.value))
                    .collect();
                (container.image, env)
            })
            .unwrap_or_default();
        Self {
            name: value.name,
            uri: value.uri,
            image,
            min_instances: scaling.min_instance_count,
            max_instances: scaling.max_instance_count,
            env,
            timeout_secs: template.timeout.as_deref().map_or(0, duration_secs),
            service_account: template.service_account,
            connector: template.vpc_access.and_then(|access| access.connector),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct JobWire {
    name: String,
    #[serde(default)]
    schedule: String,
}

impl From<JobWire> for SchedulerJob {
    fn from(value: JobWire) -> Self {
        Self {
            name: value.name,
            schedule: value.schedule,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SinkWire {
    name: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    writer_identity: String,
}

impl From<SinkWire> for LogSink {
    fn from(value: SinkWire) -> Self {
        Self {
            name: value.name,
            destination: value.destination,
            writer_identity: value.writer_identity,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct DeploymentWire {
    name: String,
    #[serde(default)]
    fingerprint: String,
    #[serde(default)]
    manifest: Option<String>,
}

impl From<DeploymentWire> for Deployment {
    fn from(value: DeploymentWire) -> Self {
        Self {
            name: value.name,
            fingerprint: value.fingerprint,
            manifest: value.manifest.filter(|manifest| !manifest.is_empty()),
        }
    }
}

#[derive(Default, Deserialize)]
struct ContentWire {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
pub(super) struct ManifestWire {
    #[serde(default)]
    config: Option<ContentWire>,
    #[serde(default)]
    layout: String,
}

impl From<ManifestWire> for Manifest {
    fn from(value: ManifestWire) -> Self {
        Self {
            config: value.config.unwrap_or_default().content,
            layout: value.layout,
        }
    }
}
