//! Per-domain client seams for the project provider.
//!
//! Each resource domain talks to its cloud API through one trait, and the
//! convergence orchestrator receives them bundled in [`ResourceClients`]
//! instead of reaching for shared package state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ClientFuture;

use super::operation::{Operation, OperationSource};

/// Service account read back from the identity API.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceAccount {
    /// Account email, used as the member identifier.
    pub email: String,
    /// Full resource name.
    pub name: String,
    /// Numeric unique id.
    pub unique_id: String,
}

/// One role binding of an IAM policy.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IamBinding {
    /// Granted role.
    pub role: String,
    /// Members holding the role.
    pub members: Vec<String>,
}

/// IAM policy document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IamPolicy {
    /// Role bindings.
    pub bindings: Vec<IamBinding>,
    /// Concurrency tag echoed back on writes.
    pub etag: Option<String>,
}

impl IamPolicy {
    /// Returns `true` when `member` holds `role`.
    #[must_use]
    pub fn has_member(&self, role: &str, member: &str) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.role == role && binding.members.iter().any(|m| m == member))
    }

    /// Adds `member` to `role`, returning `true` when the policy changed.
    pub fn add_member(&mut self, role: &str, member: &str) -> bool {
        if self.has_member(role, member) {
            return false;
        }
        if let Some(binding) = self.bindings.iter_mut().find(|binding| binding.role == role) {
            binding.members.push(member.to_owned());
        } else {
            self.bindings.push(IamBinding {
                role: role.to_owned(),
                members: vec![member.to_owned()],
            });
        }
        true
    }

    /// Removes `member` from `role`, returning `true` when the policy changed.
    pub fn remove_member(&mut self, role: &str, member: &str) -> bool {
        let mut changed = false;
        for binding in self.bindings.iter_mut().filter(|binding| binding.role == role) {
            let before = binding.members.len();
            binding.members.retain(|existing| existing != member);
            changed |= binding.members.len() != before;
        }
        self.bindings.retain(|binding| !binding.members.is_empty());
        changed
    }
}

/// VPC network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Network {
    /// Network name.
    pub name: String,
    /// Self link used by dependent resources.
    pub self_link: String,
}

/// Regional subnet to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubnetSpec {
    /// Subnet name.
    pub name: String,
    /// Self link of the parent network.
    pub network: String,
    /// Primary IPv4 range.
    pub cidr: String,
}

/// Regional subnet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subnet {
    /// Subnet name.
    pub name: String,
    /// Self link.
    pub self_link: String,
    /// Primary IPv4 range.
    pub cidr: String,
}

/// Egress firewall rule to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirewallSpec {
    /// Rule name.
    pub name: String,
    /// Self link of the network the rule applies to.
    pub network: String,
}

/// Firewall rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Firewall {
    /// Rule name.
    pub name: String,
}

/// Serverless VPC connector to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectorSpec {
    /// Connector name.
    pub name: String,
    /// Network name the connector attaches to.
    pub network: String,
    /// `/28` range reserved for the connector.
    pub cidr: String,
}

/// Serverless VPC connector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connector {
    /// Full resource name.
    pub name: String,
    /// Provider state (`READY`, `CREATING`, ...).
    pub state: String,
}

/// Firestore database.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Database {
    /// Full resource name.
    pub name: String,
    /// Location id.
    pub location: String,
}

/// Composite index definition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexSpec {
    /// Collection group the index covers.
    pub collection: String,
    /// Ascending field paths, in order.
    pub fields: Vec<String>,
}

/// KMS key ring.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyRing {
    /// Full resource name.
    pub name: String,
}

/// KMS crypto key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CryptoKey {
    /// Full resource name.
    pub name: String,
}

/// Pub/Sub topic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Topic {
    /// Full resource name.
    pub name: String,
}

/// Push subscription to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscriptionSpec {
    /// Subscription id.
    pub name: String,
    /// Full name of the source topic.
    pub topic: String,
    /// Push endpoint URL.
    pub push_endpoint: String,
    /// Service account used to mint push tokens.
    pub push_service_account: String,
}

/// Pub/Sub subscription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscription {
    /// Full resource name.
    pub name: String,
    /// Full name of the source topic.
    pub topic: String,
    /// Push endpoint URL.
    pub push_endpoint: String,
}

/// Artifact Registry repository.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Repository {
    /// Full resource name.
    pub name: String,
}

/// Desired state of a managed compute service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceSpec {
    /// Service id.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Environment passed to the container.
    pub env: BTreeMap<String, String>,
    /// Minimum instance count.
    pub min_instances: u32,
    /// Maximum instance count.
    pub max_instances: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u32,
    /// Runtime service account email.
    pub service_account: String,
    /// Full name of the VPC connector, when attached.
    pub connector: Option<String>,
}

/// Managed compute service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Service {
    /// Full resource name.
    pub name: String,
    /// Public URL.
    pub uri: String,
    /// Deployed image reference.
    pub image: String,
    /// Deployed minimum instance count.
    pub min_instances: u32,
    /// Deployed maximum instance count.
    pub max_instances: u32,
    /// Deployed container environment.
    pub env: BTreeMap<String, String>,
    /// Deployed request timeout in seconds.
    pub timeout_secs: u32,
    /// Runtime service account email.
    pub service_account: String,
    /// Attached VPC connector, if any.
    pub connector: Option<String>,
}

impl Service {
    /// Returns `true` when the deployed revision already matches `spec`.
    ///
    /// Every revision input is compared; the name is implied by the lookup.
    #[must_use]
    pub fn matches(&self, spec: &ServiceSpec) -> bool {
        self.image == spec.image
            && self.env == spec.env
            && self.min_instances == spec.min_instances
            && self.max_instances == spec.max_instances
            && self.timeout_secs == spec.timeout_secs
            && self.service_account == spec.service_account
            && self.connector == spec.connector
    }
}

/// Scheduler job to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSpec {
    /// Job id.
    pub name: String,
    /// Cron expression.
    pub schedule: String,
    /// URL invoked on every tick.
    pub target_uri: String,
    /// Service account used to mint the OIDC token.
    pub service_account: String,
}

/// Scheduler job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchedulerJob {
    /// Full resource name.
    pub name: String,
    /// Cron expression.
    pub schedule: String,
}

/// Log sink to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SinkSpec {
    /// Sink id.
    pub name: String,
    /// Destination resource (`pubsub.googleapis.com/...`).
    pub destination: String,
    /// Advanced logs filter.
    pub filter: String,
}

/// Log sink.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogSink {
    /// Sink id.
    pub name: String,
    /// Destination resource.
    pub destination: String,
    /// Identity that writes exported entries.
    pub writer_identity: String,
}

/// Project metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectInfo {
    /// Project id.
    pub project_id: String,
    /// Display name.
    pub display_name: String,
    /// Numeric project number.
    pub number: String,
    /// Lifecycle state (`ACTIVE`, `DELETE_REQUESTED`, ...).
    pub state: String,
}

/// Deployment record to create or update.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeploymentSpec {
    /// Deployment name.
    pub name: String,
    /// Top-level configuration document.
    pub config: String,
    /// Imported template files keyed by name.
    pub imports: BTreeMap<String, String>,
}

/// Deployment record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deployment {
    /// Deployment name.
    pub name: String,
    /// Optimistic concurrency fingerprint.
    pub fingerprint: String,
    /// Manifest URL or name of the last applied configuration.
    pub manifest: Option<String>,
}

/// Expanded manifest of a deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Manifest {
    /// Configuration document that produced the manifest.
    pub config: String,
    /// Expanded layout, including resource outputs.
    pub layout: String,
}

/// Service accounts and project-level role bindings.
pub trait IdentityClient: Send + Sync {
    /// Reads a service account by account id.
    fn get_service_account<'a>(
        &'a self,
        project: &'a str,
        account_id: &'a str,
    ) -> ClientFuture<'a, ServiceAccount>;
    /// Creates a service account.
    fn create_service_account<'a>(
        &'a self,
        project: &'a str,
        account_id: &'a str,
        display_name: &'a str,
    ) -> ClientFuture<'a, ServiceAccount>;
    /// Deletes a service account by email.
    fn delete_service_account<'a>(
        &'a self,
        project: &'a str,
        email: &'a str,
    ) -> ClientFuture<'a, ()>;
    /// Reads the project IAM policy.
    fn get_project_policy<'a>(&'a self, project: &'a str) -> ClientFuture<'a, IamPolicy>;
    /// Replaces the project IAM policy.
    fn set_project_policy<'a>(
        &'a self,
        project: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy>;
}

/// VPC networking and serverless connectors.
pub trait NetworkClient: Send + Sync {
    /// Reads a network.
    fn get_network<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Network>;
    /// Creates a custom-mode network.
    fn insert_network<'a>(&'a self, project: &'a str, name: &'a str)
    -> ClientFuture<'a, Operation>;
    /// Deletes a network.
    fn delete_network<'a>(&'a self, project: &'a str, name: &'a str)
    -> ClientFuture<'a, Operation>;
    /// Reads a subnet.
    fn get_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Subnet>;
    /// Creates a subnet.
    fn insert_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a SubnetSpec,
    ) -> ClientFuture<'a, Operation>;
    /// Deletes a subnet.
    fn delete_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation>;
    /// Reads a firewall rule.
    fn get_firewall<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Firewall>;
    /// Creates an egress-allow firewall rule.
    fn insert_firewall<'a>(
        &'a self,
        project: &'a str,
        spec: &'a FirewallSpec,
    ) -> ClientFuture<'a, Operation>;
    /// Deletes a firewall rule.
    fn delete_firewall<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation>;
    /// Reads a serverless connector.
    fn get_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Connector>;
    /// Creates a serverless connector.
    fn create_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ConnectorSpec,
    ) -> ClientFuture<'a, Operation>;
    /// Deletes a serverless connector.
    fn delete_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation>;
}

/// Firestore database and indexes.
pub trait DatastoreClient: Send + Sync {
    /// Reads the default database.
    fn get_database<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Database>;
    /// Creates the default native-mode database.
    fn create_database<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
    ) -> ClientFuture<'a, Operation>;
    /// Deletes the default database.
    fn delete_database<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Operation>;
    /// Lists composite indexes of the default database.
    fn list_indexes<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Vec<IndexSpec>>;
    /// Creates a composite index.
    fn create_index<'a>(
        &'a self,
        project: &'a str,
        index: &'a IndexSpec,
    ) -> ClientFuture<'a, Operation>;
}

/// Cloud KMS key rings and keys.
pub trait KeyManagementClient: Send + Sync {
    /// Reads a key ring.
    fn get_key_ring<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, KeyRing>;
    /// Creates a key ring.
    fn create_key_ring<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, KeyRing>;
    /// Reads a crypto key inside a key ring.
    fn get_crypto_key<'a>(
        &'a self,
        key_ring: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, CryptoKey>;
    /// Creates a symmetric crypto key inside a key ring.
    fn create_crypto_key<'a>(
        &'a self,
        key_ring: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, CryptoKey>;
    /// Schedules destruction of every enabled version of a key. Keys and
    /// key rings themselves cannot be deleted.
    fn destroy_key_versions<'a>(&'a self, crypto_key: &'a str) -> ClientFuture<'a, ()>;
}

/// Pub/Sub topics and subscriptions.
pub trait MessagingClient: Send + Sync {
    /// Reads a topic.
    fn get_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Topic>;
    /// Creates a topic.
    fn create_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Topic>;
    /// Deletes a topic.
    fn delete_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, ()>;
    /// Reads a subscription.
    fn get_subscription<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Subscription>;
    /// Creates a push subscription.
    fn create_subscription<'a>(
        &'a self,
        project: &'a str,
        spec: &'a SubscriptionSpec,
    ) -> ClientFuture<'a, Subscription>;
    /// Deletes a subscription.
    fn delete_subscription<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, ()>;
    /// Reads a topic IAM policy.
    fn get_topic_policy<'a>(&'a self, topic: &'a str) -> ClientFuture<'a, IamPolicy>;
    /// Replaces a topic IAM policy.
    fn set_topic_policy<'a>(
        &'a self,
        topic: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy>;
}

/// Artifact Registry repositories.
pub trait RegistryClient: Send + Sync {
    /// Reads a repository.
    fn get_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Repository>;
    /// Creates a Docker-format repository.
    fn create_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation>;
    /// Deletes a repository.
    fn delete_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation>;
}

/// Managed compute services.
pub trait ComputeClient: Send + Sync {
    /// Reads a service.
    fn get_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Service>;
    /// Creates a service.
    fn create_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ServiceSpec,
    ) -> ClientFuture<'a, Operation>;
    /// Rolls a service to a new revision.
    fn update_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ServiceSpec,
    ) -> ClientFuture<'a, Operation>;
    /// Deletes a service.
    fn delete_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation>;
    /// Reads a service IAM policy.
    fn get_service_policy<'a>(&'a self, service: &'a str) -> ClientFuture<'a, IamPolicy>;
    /// Replaces a service IAM policy.
    fn set_service_policy<'a>(
        &'a self,
        service: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy>;
}

/// Cloud Scheduler jobs.
pub trait SchedulerClient: Send + Sync {
    /// Reads a job.
    fn get_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, SchedulerJob>;
    /// Creates an HTTP job.
    fn create_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a JobSpec,
    ) -> ClientFuture<'a, SchedulerJob>;
    /// Deletes a job.
    fn delete_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, ()>;
}

/// Log export sinks.
pub trait LoggingClient: Send + Sync {
    /// Reads a sink.
    fn get_sink<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, LogSink>;
    /// Creates a sink with a unique writer identity.
    fn create_sink<'a>(&'a self, project: &'a str, spec: &'a SinkSpec)
    -> ClientFuture<'a, LogSink>;
    /// Deletes a sink.
    fn delete_sink<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, ()>;
}

/// Project container and service enablement.
pub trait ProjectClient: Send + Sync {
    /// Reads project metadata.
    fn get_project<'a>(&'a self, project: &'a str) -> ClientFuture<'a, ProjectInfo>;
    /// Submits project creation, optionally under `parent`
    /// (`organizations/<id>`).
    fn create_project<'a>(
        &'a self,
        project: &'a str,
        parent: Option<&'a str>,
        labels: &'a BTreeMap<String, String>,
    ) -> ClientFuture<'a, Operation>;
    /// Submits project deletion.
    fn delete_project<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Operation>;
    /// Enables service APIs in one batch.
    fn enable_services<'a>(
        &'a self,
        project: &'a str,
        services: &'a [String],
    ) -> ClientFuture<'a, Operation>;
}

/// Declarative deployment records.
pub trait DeploymentClient: Send + Sync {
    /// Reads a deployment.
    fn get_deployment<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Deployment>;
    /// Creates a deployment.
    fn insert_deployment<'a>(
        &'a self,
        project: &'a str,
        spec: &'a DeploymentSpec,
    ) -> ClientFuture<'a, Operation>;
    /// Replaces a deployment's configuration.
    fn update_deployment<'a>(
        &'a self,
        project: &'a str,
        spec: &'a DeploymentSpec,
        fingerprint: &'a str,
    ) -> ClientFuture<'a, Operation>;
    /// Deletes a deployment, abandoning nothing.
    fn delete_deployment<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation>;
    /// Reads a deployment manifest.
    fn get_manifest<'a>(
        &'a self,
        project: &'a str,
        deployment: &'a str,
        manifest: &'a str,
    ) -> ClientFuture<'a, Manifest>;
}

/// Every client the convergence orchestrator needs, one per domain.
#[derive(Clone)]
pub struct ResourceClients {
    /// Identity client.
    pub identity: Arc<dyn IdentityClient>,
    /// Network client.
    pub network: Arc<dyn NetworkClient>,
    /// Datastore client.
    pub datastore: Arc<dyn DatastoreClient>,
    /// Key management client.
    pub keys: Arc<dyn KeyManagementClient>,
    /// Messaging client.
    pub messaging: Arc<dyn MessagingClient>,
    /// Registry client.
    pub registry: Arc<dyn RegistryClient>,
    /// Compute client.
    pub compute: Arc<dyn ComputeClient>,
    /// Scheduler client.
    pub scheduler: Arc<dyn SchedulerClient>,
    /// Logging client.
    pub logging: Arc<dyn LoggingClient>,
    /// Refreshes long-running operations from any domain.
    pub operations: Arc<dyn OperationSource>,
}

impl ResourceClients {
    /// Builds the bundle from one value implementing every domain trait.
    #[must_use]
    pub fn from_shared<C>(client: &Arc<C>) -> Self
    where
        C: IdentityClient
            + NetworkClient
            + DatastoreClient
            + KeyManagementClient
            + MessagingClient
            + RegistryClient
            + ComputeClient
            + SchedulerClient
            + LoggingClient
            + OperationSource
            + 'static,
    {
        Self {
            identity: Arc::clone(client) as Arc<dyn IdentityClient>,
            network: Arc::clone(client) as Arc<dyn NetworkClient>,
            datastore: Arc::clone(client) as Arc<dyn DatastoreClient>,
            keys: Arc::clone(client) as Arc<dyn KeyManagementClient>,
            messaging: Arc::clone(client) as Arc<dyn MessagingClient>,
            registry: Arc::clone(client) as Arc<dyn RegistryClient>,
            compute: Arc::clone(client) as Arc<dyn ComputeClient>,
            scheduler: Arc::clone(client) as Arc<dyn SchedulerClient>,
            logging: Arc::clone(client) as Arc<dyn LoggingClient>,
            operations: Arc::clone(client) as Arc<dyn OperationSource>,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn add_member_is_idempotent() {
        let mut policy = IamPolicy::default();
        assert!(policy.add_member("roles/viewer", "serviceAccount:a@x"));
        assert!(!policy.add_member("roles/viewer", "serviceAccount:a@x"));
        assert!(policy.add_member("roles/viewer", "serviceAccount:b@x"));
        assert_eq!(policy.bindings.len(), 1);
    }

    fn deployed() -> (Service, ServiceSpec) {
        let spec = ServiceSpec {
            name: String::from("orch"),
            image: String::from("gcr.io/p/orch:v1"),
            env: BTreeMap::from([(String::from("REGION"), String::from("us-central1"))]),
            min_instances: 0,
            max_instances: 3,
            timeout_secs: 300,
            service_account: String::from("control@p.iam.gserviceaccount.com"),
            connector: Some(String::from("projects/p/locations/us-central1/connectors/c")),
        };
        let service = Service {
            name: String::from("projects/p/locations/us-central1/services/orch"),
            uri: String::from("https://orch.example.run.app"),
            image: spec.image.clone(),
            min_instances: spec.min_instances,
            max_instances: spec.max_instances,
            env: spec.env.clone(),
            timeout_secs: spec.timeout_secs,
            service_account: spec.service_account.clone(),
            connector: spec.connector.clone(),
        };
        (service, spec)
    }

    #[rstest]
    fn identical_revision_matches() {
        let (service, spec) = deployed();
        assert!(service.matches(&spec));
    }

    #[rstest]
    #[case::image(|spec: &mut ServiceSpec| spec.image = String::from("gcr.io/p/orch:v2"))]
    #[case::env(|spec: &mut ServiceSpec| {
        spec.env.insert(String::from("CONTROL_TOPIC"), String::from("projects/p/topics/c"));
    })]
    #[case::scaling(|spec: &mut ServiceSpec| spec.max_instances = 5)]
    #[case::timeout(|spec: &mut ServiceSpec| spec.timeout_secs = 600)]
    #[case::account(|spec: &mut ServiceSpec| {
        spec.service_account = String::from("other@p.iam.gserviceaccount.com");
    })]
    #[case::connector(|spec: &mut ServiceSpec| spec.connector = None)]
    fn any_revision_input_change_is_a_mismatch(#[case] change: fn(&mut ServiceSpec)) {
        let (service, mut spec) = deployed();
        change(&mut spec);
        assert!(!service.matches(&spec));
    }

    #[rstest]
    fn remove_member_drops_empty_bindings() {
        let mut policy = IamPolicy::default();
        policy.add_member("roles/run.invoker", "allUsers");
        assert!(policy.remove_member("roles/run.invoker", "allUsers"));
        assert!(!policy.remove_member("roles/run.invoker", "allUsers"));
        assert!(policy.bindings.is_empty());
    }
}
