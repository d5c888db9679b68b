//! Scripted in-memory fakes shared across unit and integration tests.
//!
//! [`FakeStacks`] stands in for the templated-stack API and [`FakeCloud`]
//! for every project-path client trait. Both record each call in order so
//! tests can assert on sequencing, and both accept injected failures.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_yaml::{Mapping, Value};

use crate::error::{ClientError, ClientFuture};
use crate::project::Domain;
use crate::project::clients::{
    ComputeClient, Connector, ConnectorSpec, CryptoKey, Database, DatastoreClient, Deployment,
    DeploymentClient, DeploymentSpec, Firewall, FirewallSpec, IamPolicy, IdentityClient,
    IndexSpec, JobSpec, KeyManagementClient, KeyRing, LogSink, LoggingClient, Manifest,
    MessagingClient, Network, NetworkClient, ProjectClient, ProjectInfo, RegistryClient,
    Repository, SchedulerClient, SchedulerJob, Service, ServiceAccount, ServiceSpec, SinkSpec,
    Subnet, SubnetSpec, Subscription, SubscriptionSpec, Topic,
};
use crate::project::operation::{Operation, OperationSource};
use crate::stack::client::{StackClient, StackDescription, StackRequest};
use crate::stack::{StackEvent, StackOutput, StackStatus};

fn ready<'a, T: Send + 'a>(result: Result<T, ClientError>) -> ClientFuture<'a, T> {
    Box::pin(future::ready(result))
}

fn key(parts: &[&str]) -> String {
    parts.join("/")
}

fn not_found(kind: &str, name: &str) -> ClientError {
    ClientError::NotFound(format!("{kind} {name}"))
}

fn already_exists(kind: &str, name: &str) -> ClientError {
    ClientError::AlreadyExists(format!("{kind} {name}"))
}

// ---------------------------------------------------------------------------
// Templated stacks
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StackEntry {
    request: StackRequest,
    queue: VecDeque<Option<StackStatus>>,
}

#[derive(Debug, Default)]
struct StackState {
    stacks: BTreeMap<String, StackEntry>,
    calls: Vec<String>,
    requests: Vec<StackRequest>,
    scripted: Option<Vec<StackStatus>>,
    events: Vec<StackEvent>,
    outputs: Vec<StackOutput>,
    failures: BTreeMap<String, ClientError>,
}

/// Scripted templated-stack API.
///
/// Every submitted operation moves the stack through a status queue: the
/// head is popped on each describe until one entry remains, which then
/// sticks. `None` in the queue means the stack is gone.
#[derive(Clone, Debug, Default)]
pub struct FakeStacks {
    state: Arc<Mutex<StackState>>,
}

impl FakeStacks {
    /// Creates an empty fake with no stacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the outputs every described stack reports.
    #[must_use]
    pub fn with_outputs(self, outputs: &[(&str, &str)]) -> Self {
        self.lock().outputs = outputs
            .iter()
            .map(|(key, value)| StackOutput {
                key: (*key).to_owned(),
                value: (*value).to_owned(),
            })
            .collect();
        self
    }

    /// Scripts the statuses the next create or update walks through.
    pub fn script_next(&self, statuses: Vec<StackStatus>) {
        self.lock().scripted = Some(statuses);
    }

    /// Sets the events returned by `stack_events`.
    pub fn set_events(&self, events: Vec<StackEvent>) {
        self.lock().events = events;
    }

    /// Makes every call to `method` fail with `error`.
    pub fn fail_on(&self, method: &str, error: ClientError) {
        self.lock().failures.insert(method.to_owned(), error);
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls made to `method`.
    #[must_use]
    pub fn count_calls(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|call| *call == method).count()
    }

    /// Most recent create or update request.
    #[must_use]
    pub fn last_request(&self) -> Option<StackRequest> {
        self.lock().requests.last().cloned()
    }

    fn call<T>(
        &self,
        method: &str,
        body: impl FnOnce(&mut StackState) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut state = self.lock();
        state.calls.push(method.to_owned());
        if let Some(error) = state.failures.get(method) {
            return Err(error.clone());
        }
        body(&mut state)
    }
}

fn missing_stack(name: &str) -> ClientError {
    ClientError::Api {
        status: 400,
        message: format!("Stack with id {name} does not exist"),
    }
}

fn status_queue(
    scripted: Option<Vec<StackStatus>>,
    defaults: [StackStatus; 2],
) -> VecDeque<Option<StackStatus>> {
    scripted
        .unwrap_or_else(|| defaults.to_vec())
        .into_iter()
        .map(Some)
        .collect()
}

impl StackClient for FakeStacks {
    fn describe_stack<'a>(&'a self, name: &'a str) -> ClientFuture<'a, StackDescription> {
        ready(self.call("describe_stack", |state| {
            let outputs = state.outputs.clone();
            let entry = state.stacks.get_mut(name).ok_or_else(|| missing_stack(name))?;
            let current = if entry.queue.len() > 1 {
                entry.queue.pop_front().flatten()
            } else {
                entry.queue.front().cloned().flatten()
            };
            let Some(status) = current else {
                state.stacks.remove(name);
                return Err(missing_stack(name));
            };
            Ok(StackDescription {
                name: name.to_owned(),
                status,
                status_reason: None,
                outputs,
            })
        }))
    }

    fn create_stack<'a>(&'a self, request: &'a StackRequest) -> ClientFuture<'a, String> {
        ready(self.call("create_stack", |state| {
            if state.stacks.contains_key(&request.name) {
                return Err(already_exists("stack", &request.name));
            }
            let queue = status_queue(
                state.scripted.take(),
                [StackStatus::CreateInProgress, StackStatus::CreateComplete],
            );
            state.requests.push(request.clone());
            state.stacks.insert(
                request.name.clone(),
                StackEntry {
                    request: request.clone(),
                    queue,
                },
            );
            Ok(format!("stack/{}", request.name))
        }))
    }

    fn update_stack<'a>(&'a self, request: &'a StackRequest) -> ClientFuture<'a, String> {
        ready(self.call("update_stack", |state| {
            let scripted = state.scripted.take();
            let entry = state
                .stacks
                .get_mut(&request.name)
                .ok_or_else(|| missing_stack(&request.name))?;
            if entry.request.template == request.template
                && entry.request.parameters == request.parameters
            {
                return Err(ClientError::Api {
                    status: 400,
                    message: String::from("No updates are to be performed."),
                });
            }
            entry.request = request.clone();
            entry.queue = status_queue(
                scripted,
                [StackStatus::UpdateInProgress, StackStatus::UpdateComplete],
            );
            state.requests.push(request.clone());
            Ok(format!("stack/{}", request.name))
        }))
    }

    fn delete_stack<'a>(&'a self, name: &'a str) -> ClientFuture<'a, ()> {
        ready(self.call("delete_stack", |state| {
            if let Some(entry) = state.stacks.get_mut(name) {
                entry.queue = VecDeque::from([Some(StackStatus::DeleteInProgress), None]);
            }
            Ok(())
        }))
    }

    fn stack_events<'a>(&'a self, _name: &'a str) -> ClientFuture<'a, Vec<StackEvent>> {
        ready(self.call("stack_events", |state| Ok(state.events.clone())))
    }
}

// ---------------------------------------------------------------------------
// Project plus resource graph
// ---------------------------------------------------------------------------

/// Message the fake returns for projects it does not know.
pub const MISSING_PROJECT_MESSAGE: &str =
    "The caller does not have permission, or the project may not exist";

#[derive(Clone, Debug)]
enum Deferred {
    CreateProject {
        project: String,
        labels: BTreeMap<String, String>,
    },
    DeleteProject(String),
}

#[derive(Clone, Debug)]
struct PendingOperation {
    remaining: u32,
    deferred: Option<Deferred>,
    errors: Vec<String>,
}

#[derive(Clone, Debug)]
struct DeploymentEntry {
    deployment: Deployment,
    manifests: BTreeMap<String, Manifest>,
}

#[derive(Debug, Default)]
struct CloudState {
    calls: Vec<String>,
    failures: BTreeMap<String, ClientError>,
    failing_operations: BTreeMap<String, String>,
    operation_delay: u32,
    counter: u64,
    operations: BTreeMap<String, PendingOperation>,
    projects: BTreeMap<String, ProjectInfo>,
    project_labels: BTreeMap<String, BTreeMap<String, String>>,
    enabled_services: BTreeMap<String, BTreeSet<String>>,
    races: BTreeSet<String>,
    accounts: BTreeMap<String, ServiceAccount>,
    project_policies: BTreeMap<String, IamPolicy>,
    resource_policies: BTreeMap<String, IamPolicy>,
    networks: BTreeMap<String, Network>,
    subnets: BTreeMap<String, Subnet>,
    firewalls: BTreeMap<String, Firewall>,
    connectors: BTreeMap<String, Connector>,
    databases: BTreeMap<String, Database>,
    indexes: BTreeMap<String, Vec<IndexSpec>>,
    key_rings: BTreeMap<String, KeyRing>,
    crypto_keys: BTreeMap<String, CryptoKey>,
    destroyed_keys: BTreeSet<String>,
    topics: BTreeMap<String, Topic>,
    subscriptions: BTreeMap<String, Subscription>,
    repositories: BTreeMap<String, Repository>,
    services: BTreeMap<String, Service>,
    service_uris: BTreeMap<String, String>,
    jobs: BTreeMap<String, SchedulerJob>,
    sinks: BTreeMap<String, LogSink>,
    deployments: BTreeMap<String, DeploymentEntry>,
}

impl CloudState {
    fn next_id(&mut self) -> u64 {
        self.counter = self.counter.saturating_add(1);
        self.counter
    }

    fn start_operation(&mut self, method: &str, deferred: Option<Deferred>) -> Operation {
        let id = self.next_id();
        let name = format!("operations/op-{id}");
        let errors = self
            .failing_operations
            .get(method)
            .map(|message| vec![message.clone()])
            .unwrap_or_default();
        self.operations.insert(
            name.clone(),
            PendingOperation {
                remaining: self.operation_delay.max(1),
                deferred,
                errors,
            },
        );
        Operation {
            poll_url: format!("fake://{name}"),
            name,
            done: false,
            errors: Vec::new(),
        }
    }

    fn apply(&mut self, deferred: Deferred) {
        match deferred {
            Deferred::CreateProject { project, labels } => {
                let number = 400_000_u64.saturating_add(self.next_id());
                self.project_labels.insert(project.clone(), labels);
                self.projects.insert(
                    project.clone(),
                    ProjectInfo {
                        display_name: project.clone(),
                        project_id: project,
                        number: number.to_string(),
                        state: String::from("ACTIVE"),
                    },
                );
            }
            Deferred::DeleteProject(project) => {
                self.projects.remove(&project);
            }
        }
    }
}

/// In-memory implementation of every project-path client trait.
///
/// Mutations apply when submitted, except project creation and deletion,
/// which take effect once their operation completes. Operations complete
/// after a configurable number of refreshes (one by default).
///
/// Names follow the provider's shapes: topics are
/// `projects/<p>/topics/<id>`, service accounts are
/// `<id>@<p>.iam.gserviceaccount.com`, services default to the URL
/// `https://<id>-fake.a.run.app`, and so on.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    /// Creates an empty cloud with no projects.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an existing, active project whose APIs are not enabled yet.
    #[must_use]
    pub fn with_project(self, project: &str) -> Self {
        self.lock().apply(Deferred::CreateProject {
            project: project.to_owned(),
            labels: BTreeMap::new(),
        });
        self
    }

    /// Marks `project` as having its APIs enabled. Resource calls against a
    /// project without enabled APIs fail with a permission error.
    #[must_use]
    pub fn with_services_enabled(self, project: &str) -> Self {
        self.lock()
            .enabled_services
            .entry(project.to_owned())
            .or_default();
        self
    }

    /// Sets the URL returned for the service named `service`.
    #[must_use]
    pub fn with_service_uri(self, service: &str, uri: &str) -> Self {
        self.lock()
            .service_uris
            .insert(service.to_owned(), uri.to_owned());
        self
    }

    /// Sets how many refreshes an operation needs before it completes.
    #[must_use]
    pub fn with_operation_delay(self, refreshes: u32) -> Self {
        self.lock().operation_delay = refreshes;
        self
    }

    /// Makes every call to `method` fail with `error`.
    pub fn fail_on(&self, method: &str, error: ClientError) {
        self.lock().failures.insert(method.to_owned(), error);
    }

    /// Makes the next call to `method` lose a creation race: the resource
    /// is stored as if another caller created it, and the call answers
    /// with an already-exists error.
    pub fn race_next(&self, method: &str) {
        self.lock().races.insert(method.to_owned());
    }

    /// Makes operations started by `method` finish with `message`.
    pub fn fail_operation(&self, method: &str, message: &str) {
        self.lock()
            .failing_operations
            .insert(method.to_owned(), message.to_owned());
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls made to `method`.
    #[must_use]
    pub fn count_calls(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|call| *call == method).count()
    }

    /// Forgets recorded calls, keeping all resources.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Domains touched by the recorded calls, with consecutive repeats
    /// collapsed.
    #[must_use]
    pub fn domain_sequence(&self) -> Vec<Domain> {
        let mut sequence: Vec<Domain> = Vec::new();
        for domain in self.calls().iter().filter_map(|call| domain_of(call)) {
            if sequence.last() != Some(&domain) {
                sequence.push(domain);
            }
        }
        sequence
    }

    /// Returns `true` when `project` exists.
    #[must_use]
    pub fn has_project(&self, project: &str) -> bool {
        self.lock().projects.contains_key(project)
    }

    /// Services enabled on `project`.
    #[must_use]
    pub fn enabled_services(&self, project: &str) -> BTreeSet<String> {
        self.lock()
            .enabled_services
            .get(project)
            .cloned()
            .unwrap_or_default()
    }

    /// Labels `project` was created with.
    #[must_use]
    pub fn project_labels(&self, project: &str) -> BTreeMap<String, String> {
        self.lock()
            .project_labels
            .get(project)
            .cloned()
            .unwrap_or_default()
    }

    /// Reads a stored service by id.
    #[must_use]
    pub fn service(&self, project: &str, region: &str, name: &str) -> Option<Service> {
        self.lock()
            .services
            .get(&key(&[project, region, name]))
            .cloned()
    }

    /// Reads the IAM policy stored for a topic or service resource name.
    #[must_use]
    pub fn resource_policy(&self, resource: &str) -> IamPolicy {
        self.lock()
            .resource_policies
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    /// Reads a stored subscription by id.
    #[must_use]
    pub fn subscription(&self, project: &str, name: &str) -> Option<Subscription> {
        self.lock().subscriptions.get(&key(&[project, name])).cloned()
    }

    /// Number of resources of every kind currently stored.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        let state = self.lock();
        state.accounts.len()
            + state.networks.len()
            + state.subnets.len()
            + state.firewalls.len()
            + state.connectors.len()
            + state.databases.len()
            + state.topics.len()
            + state.subscriptions.len()
            + state.repositories.len()
            + state.services.len()
            + state.jobs.len()
            + state.sinks.len()
            + state.deployments.len()
    }

    fn call<T>(
        &self,
        method: &str,
        body: impl FnOnce(&mut CloudState) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut state = self.lock();
        state.calls.push(method.to_owned());
        if let Some(error) = state.failures.get(method) {
            return Err(error.clone());
        }
        let result = body(&mut state);
        if result.is_ok() && state.races.remove(method) {
            return Err(ClientError::AlreadyExists(format!(
                "{method}: resource was created concurrently"
            )));
        }
        result
    }

    /// Like [`Self::call`], but refuses to serve a project whose APIs were
    /// never enabled.
    fn call_in<T>(
        &self,
        project: &str,
        method: &str,
        body: impl FnOnce(&mut CloudState) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        self.call(method, |state| {
            if !state.enabled_services.contains_key(project) {
                return Err(ClientError::PermissionDenied(format!(
                    "{method}: API has not been used in project {project} before or it is disabled"
                )));
            }
            body(state)
        })
    }
}

/// Maps a recorded fake method to the domain that issues it.
#[must_use]
pub fn domain_of(method: &str) -> Option<Domain> {
    let domain = match method {
        "get_service_account"
        | "create_service_account"
        | "delete_service_account"
        | "get_project_policy"
        | "set_project_policy" => Domain::Identity,
        "get_network" | "insert_network" | "delete_network" | "get_subnet" | "insert_subnet"
        | "delete_subnet" | "get_firewall" | "insert_firewall" | "delete_firewall"
        | "get_connector" | "create_connector" | "delete_connector" => Domain::Network,
        "get_database" | "create_database" | "delete_database" | "list_indexes"
        | "create_index" => Domain::Datastore,
        "get_key_ring" | "create_key_ring" | "get_crypto_key" | "create_crypto_key"
        | "destroy_key_versions" => Domain::Encryption,
        "get_topic" | "create_topic" | "delete_topic" => Domain::Messaging,
        "get_repository" | "create_repository" | "delete_repository" => Domain::Registry,
        "get_service" | "create_service" | "update_service" | "delete_service"
        | "get_service_policy" | "set_service_policy" => Domain::Compute,
        "get_subscription" | "create_subscription" | "delete_subscription" => {
            Domain::EventWiring
        }
        "get_job" | "create_job" | "delete_job" => Domain::Scheduling,
        "get_sink" | "create_sink" | "delete_sink" | "get_topic_policy" | "set_topic_policy" => {
            Domain::Logging
        }
        "get_deployment" | "insert_deployment" | "update_deployment" | "delete_deployment"
        | "get_manifest" => Domain::DeploymentRecord,
        "get_project" | "create_project" | "delete_project" | "enable_services" => {
            Domain::Project
        }
        _ => return None,
    };
    Some(domain)
}

/// Expands a record configuration the way the record template does: every
/// property of the first resource becomes an output.
fn expand_layout(config: &str) -> String {
    let document: Value = serde_yaml::from_str(config).unwrap_or(Value::Null);
    let Some(block) = document
        .get("resources")
        .and_then(Value::as_sequence)
        .and_then(|resources| resources.first())
    else {
        return String::new();
    };
    let outputs: Vec<Value> = block
        .get("properties")
        .and_then(Value::as_mapping)
        .map(|properties| {
            properties
                .iter()
                .map(|(name, value)| {
                    let mut output = Mapping::new();
                    output.insert(Value::from("name"), name.clone());
                    output.insert(Value::from("finalValue"), value.clone());
                    Value::Mapping(output)
                })
                .collect()
        })
        .unwrap_or_default();

    let mut resource = Mapping::new();
    resource.insert(
        Value::from("name"),
        block.get("name").cloned().unwrap_or(Value::Null),
    );
    resource.insert(
        Value::from("type"),
        block.get("type").cloned().unwrap_or(Value::Null),
    );
    resource.insert(Value::from("outputs"), Value::Sequence(outputs));
    let mut layout = Mapping::new();
    layout.insert(
        Value::from("resources"),
        Value::Sequence(vec![Value::Mapping(resource)]),
    );
    serde_yaml::to_string(&Value::Mapping(layout)).unwrap_or_default()
}

impl OperationSource for FakeCloud {
    fn refresh_operation<'a>(&'a self, operation: &'a Operation) -> ClientFuture<'a, Operation> {
        ready(self.call("refresh_operation", |state| {
            let pending = state
                .operations
                .get_mut(&operation.name)
                .ok_or_else(|| not_found("operation", &operation.name))?;
            pending.remaining = pending.remaining.saturating_sub(1);
            if pending.remaining > 0 {
                return Ok(operation.clone());
            }
            let finished = pending.clone();
            state.operations.remove(&operation.name);
            if finished.errors.is_empty()
                && let Some(deferred) = finished.deferred
            {
                state.apply(deferred);
            }
            Ok(Operation {
                done: true,
                errors: finished.errors,
                ..operation.clone()
            })
        }))
    }
}

impl ProjectClient for FakeCloud {
    fn get_project<'a>(&'a self, project: &'a str) -> ClientFuture<'a, ProjectInfo> {
        ready(self.call("get_project", |state| {
            state
                .projects
                .get(project)
                .cloned()
                .ok_or_else(|| ClientError::PermissionDenied(MISSING_PROJECT_MESSAGE.to_owned()))
        }))
    }

    fn create_project<'a>(
        &'a self,
        project: &'a str,
        parent: Option<&'a str>,
        labels: &'a BTreeMap<String, String>,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call("create_project", |state| {
            if state.projects.contains_key(project) {
                return Err(already_exists("project", project));
            }
            if parent.is_some_and(|value| !value.starts_with("organizations/")) {
                return Err(ClientError::Api {
                    status: 400,
                    message: String::from("parent must be organizations/<id>"),
                });
            }
            Ok(state.start_operation(
                "create_project",
                Some(Deferred::CreateProject {
                    project: project.to_owned(),
                    labels: labels.clone(),
                }),
            ))
        }))
    }

    fn delete_project<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Operation> {
        ready(self.call("delete_project", |state| {
            if !state.projects.contains_key(project) {
                return Err(not_found("project", project));
            }
            Ok(state.start_operation(
                "delete_project",
                Some(Deferred::DeleteProject(project.to_owned())),
            ))
        }))
    }

    fn enable_services<'a>(
        &'a self,
        project: &'a str,
        services: &'a [String],
    ) -> ClientFuture<'a, Operation> {
        ready(self.call("enable_services", |state| {
            state
                .enabled_services
                .entry(project.to_owned())
                .or_default()
                .extend(services.iter().cloned());
            Ok(state.start_operation("enable_services", None))
        }))
    }
}

impl IdentityClient for FakeCloud {
    fn get_service_account<'a>(
        &'a self,
        project: &'a str,
        account_id: &'a str,
    ) -> ClientFuture<'a, ServiceAccount> {
        ready(self.call_in(project, "get_service_account", |state| {
            state
                .accounts
                .get(&key(&[project, account_id]))
                .cloned()
                .ok_or_else(|| not_found("service account", account_id))
        }))
    }

    fn create_service_account<'a>(
        &'a self,
        project: &'a str,
        account_id: &'a str,
        _display_name: &'a str,
    ) -> ClientFuture<'a, ServiceAccount> {
        ready(self.call_in(project, "create_service_account", |state| {
            let id = key(&[project, account_id]);
            if state.accounts.contains_key(&id) {
                return Err(already_exists("service account", account_id));
            }
            let email = format!("{account_id}@{project}.iam.gserviceaccount.com");
            let account = ServiceAccount {
                name: format!("projects/{project}/serviceAccounts/{email}"),
                unique_id: format!("10{}", state.next_id()),
                email,
            };
            state.accounts.insert(id, account.clone());
            Ok(account)
        }))
    }

    fn delete_service_account<'a>(
        &'a self,
        project: &'a str,
        email: &'a str,
    ) -> ClientFuture<'a, ()> {
        ready(self.call_in(project, "delete_service_account", |state| {
            let before = state.accounts.len();
            state
                .accounts
                .retain(|id, account| !(id.starts_with(project) && account.email == email));
            if state.accounts.len() == before {
                return Err(not_found("service account", email));
            }
            Ok(())
        }))
    }

    fn get_project_policy<'a>(&'a self, project: &'a str) -> ClientFuture<'a, IamPolicy> {
        ready(self.call_in(project, "get_project_policy", |state| {
            Ok(state
                .project_policies
                .get(project)
                .cloned()
                .unwrap_or_default())
        }))
    }

    fn set_project_policy<'a>(
        &'a self,
        project: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy> {
        ready(self.call_in(project, "set_project_policy", |state| {
            state
                .project_policies
                .insert(project.to_owned(), policy.clone());
            Ok(policy.clone())
        }))
    }
}

impl NetworkClient for FakeCloud {
    fn get_network<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Network> {
        ready(self.call_in(project, "get_network", |state| {
            state
                .networks
                .get(&key(&[project, name]))
                .cloned()
                .ok_or_else(|| not_found("network", name))
        }))
    }

    fn insert_network<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "insert_network", |state| {
            let id = key(&[project, name]);
            if state.networks.contains_key(&id) {
                return Err(already_exists("network", name));
            }
            state.networks.insert(
                id,
                Network {
                    name: name.to_owned(),
                    self_link: format!(
                        "https://www.googleapis.com/compute/v1/projects/{project}/global/networks/{name}"
                    ),
                },
            );
            Ok(state.start_operation("insert_network", None))
        }))
    }

    fn delete_network<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_network", |state| {
            state
                .networks
                .remove(&key(&[project, name]))
                .ok_or_else(|| not_found("network", name))?;
            Ok(state.start_operation("delete_network", None))
        }))
    }

    fn get_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Subnet> {
        ready(self.call_in(project, "get_subnet", |state| {
            state
                .subnets
                .get(&key(&[project, region, name]))
                .cloned()
                .ok_or_else(|| not_found("subnet", name))
        }))
    }

    fn insert_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a SubnetSpec,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "insert_subnet", |state| {
            let id = key(&[project, region, &spec.name]);
            if state.subnets.contains_key(&id) {
                return Err(already_exists("subnet", &spec.name));
            }
            state.subnets.insert(
                id,
                Subnet {
                    name: spec.name.clone(),
                    self_link: format!(
                        "https://www.googleapis.com/compute/v1/projects/{project}/regions/{region}/subnetworks/{}",
                        spec.name
                    ),
                    cidr: spec.cidr.clone(),
                },
            );
            Ok(state.start_operation("insert_subnet", None))
        }))
    }

    fn delete_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_subnet", |state| {
            state
                .subnets
                .remove(&key(&[project, region, name]))
                .ok_or_else(|| not_found("subnet", name))?;
            Ok(state.start_operation("delete_subnet", None))
        }))
    }

    fn get_firewall<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Firewall> {
        ready(self.call_in(project, "get_firewall", |state| {
            state
                .firewalls
                .get(&key(&[project, name]))
                .cloned()
                .ok_or_else(|| not_found("firewall", name))
        }))
    }

    fn insert_firewall<'a>(
        &'a self,
        project: &'a str,
        spec: &'a FirewallSpec,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "insert_firewall", |state| {
            let id = key(&[project, &spec.name]);
            if state.firewalls.contains_key(&id) {
                return Err(already_exists("firewall", &spec.name));
            }
            state.firewalls.insert(
                id,
                Firewall {
                    name: spec.name.clone(),
                },
            );
            Ok(state.start_operation("insert_firewall", None))
        }))
    }

    fn delete_firewall<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_firewall", |state| {
            state
                .firewalls
                .remove(&key(&[project, name]))
                .ok_or_else(|| not_found("firewall", name))?;
            Ok(state.start_operation("delete_firewall", None))
        }))
    }

    fn get_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Connector> {
        ready(self.call_in(project, "get_connector", |state| {
            state
                .connectors
                .get(&key(&[project, region, name]))
                .cloned()
                .ok_or_else(|| not_found("connector", name))
        }))
    }

    fn create_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ConnectorSpec,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "create_connector", |state| {
            let id = key(&[project, region, &spec.name]);
            if state.connectors.contains_key(&id) {
                return Err(already_exists("connector", &spec.name));
            }
            state.connectors.insert(
                id,
                Connector {
                    name: format!(
                        "projects/{project}/locations/{region}/connectors/{}",
                        spec.name
                    ),
                    state: String::from("READY"),
                },
            );
            Ok(state.start_operation("create_connector", None))
        }))
    }

    fn delete_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_connector", |state| {
            state
                .connectors
                .remove(&key(&[project, region, name]))
                .ok_or_else(|| not_found("connector", name))?;
            Ok(state.start_operation("delete_connector", None))
        }))
    }
}

impl DatastoreClient for FakeCloud {
    fn get_database<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Database> {
        ready(self.call_in(project, "get_database", |state| {
            state
                .databases
                .get(project)
                .cloned()
                .ok_or_else(|| not_found("database", project))
        }))
    }

    fn create_database<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "create_database", |state| {
            if state.databases.contains_key(project) {
                return Err(already_exists("database", project));
            }
            state.databases.insert(
                project.to_owned(),
                Database {
                    name: format!("projects/{project}/databases/(default)"),
                    location: location.to_owned(),
                },
            );
            Ok(state.start_operation("create_database", None))
        }))
    }

    fn delete_database<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_database", |state| {
            state
                .databases
                .remove(project)
                .ok_or_else(|| not_found("database", project))?;
            state.indexes.remove(project);
            Ok(state.start_operation("delete_database", None))
        }))
    }

    fn list_indexes<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Vec<IndexSpec>> {
        ready(self.call_in(project, "list_indexes", |state| {
            Ok(state.indexes.get(project).cloned().unwrap_or_default())
        }))
    }

    fn create_index<'a>(
        &'a self,
        project: &'a str,
        index: &'a IndexSpec,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "create_index", |state| {
            let indexes = state.indexes.entry(project.to_owned()).or_default();
            if indexes.contains(index) {
                return Err(already_exists("index", &index.collection));
            }
            indexes.push(index.clone());
            Ok(state.start_operation("create_index", None))
        }))
    }
}

impl KeyManagementClient for FakeCloud {
    fn get_key_ring<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, KeyRing> {
        ready(self.call_in(project, "get_key_ring", |state| {
            state
                .key_rings
                .get(&format!("projects/{project}/locations/{location}/keyRings/{name}"))
                .cloned()
                .ok_or_else(|| not_found("key ring", name))
        }))
    }

    fn create_key_ring<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, KeyRing> {
        ready(self.call_in(project, "create_key_ring", |state| {
            let full = format!("projects/{project}/locations/{location}/keyRings/{name}");
            if state.key_rings.contains_key(&full) {
                return Err(already_exists("key ring", name));
            }
            let ring = KeyRing { name: full.clone() };
            state.key_rings.insert(full, ring.clone());
            Ok(ring)
        }))
    }

    fn get_crypto_key<'a>(
        &'a self,
        key_ring: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, CryptoKey> {
        ready(self.call("get_crypto_key", |state| {
            state
                .crypto_keys
                .get(&format!("{key_ring}/cryptoKeys/{name}"))
                .cloned()
                .ok_or_else(|| not_found("crypto key", name))
        }))
    }

    fn create_crypto_key<'a>(
        &'a self,
        key_ring: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, CryptoKey> {
        ready(self.call("create_crypto_key", |state| {
            let full = format!("{key_ring}/cryptoKeys/{name}");
            if state.crypto_keys.contains_key(&full) {
                return Err(already_exists("crypto key", name));
            }
            let crypto_key = CryptoKey { name: full.clone() };
            state.crypto_keys.insert(full, crypto_key.clone());
            Ok(crypto_key)
        }))
    }

    fn destroy_key_versions<'a>(&'a self, crypto_key: &'a str) -> ClientFuture<'a, ()> {
        ready(self.call("destroy_key_versions", |state| {
            if !state.crypto_keys.contains_key(crypto_key) {
                return Err(not_found("crypto key", crypto_key));
            }
            state.destroyed_keys.insert(crypto_key.to_owned());
            Ok(())
        }))
    }
}

impl MessagingClient for FakeCloud {
    fn get_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Topic> {
        ready(self.call_in(project, "get_topic", |state| {
            state
                .topics
                .get(&format!("projects/{project}/topics/{name}"))
                .cloned()
                .ok_or_else(|| not_found("topic", name))
        }))
    }

    fn create_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Topic> {
        ready(self.call_in(project, "create_topic", |state| {
            let full = format!("projects/{project}/topics/{name}");
            if state.topics.contains_key(&full) {
                return Err(already_exists("topic", name));
            }
            let topic = Topic { name: full.clone() };
            state.topics.insert(full, topic.clone());
            Ok(topic)
        }))
    }

    fn delete_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, ()> {
        ready(self.call_in(project, "delete_topic", |state| {
            let full = format!("projects/{project}/topics/{name}");
            state
                .topics
                .remove(&full)
                .ok_or_else(|| not_found("topic", name))?;
            state.resource_policies.remove(&full);
            Ok(())
        }))
    }

    fn get_subscription<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Subscription> {
        ready(self.call_in(project, "get_subscription", |state| {
            state
                .subscriptions
                .get(&key(&[project, name]))
                .cloned()
                .ok_or_else(|| not_found("subscription", name))
        }))
    }

    fn create_subscription<'a>(
        &'a self,
        project: &'a str,
        spec: &'a SubscriptionSpec,
    ) -> ClientFuture<'a, Subscription> {
        ready(self.call_in(project, "create_subscription", |state| {
            let id = key(&[project, &spec.name]);
            if state.subscriptions.contains_key(&id) {
                return Err(already_exists("subscription", &spec.name));
            }
            if !state.topics.contains_key(&spec.topic) {
                return Err(not_found("topic", &spec.topic));
            }
            let subscription = Subscription {
                name: format!("projects/{project}/subscriptions/{}", spec.name),
                topic: spec.topic.clone(),
                push_endpoint: spec.push_endpoint.clone(),
            };
            state.subscriptions.insert(id, subscription.clone());
            Ok(subscription)
        }))
    }

    fn delete_subscription<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, ()> {
        ready(self.call_in(project, "delete_subscription", |state| {
            state
                .subscriptions
                .remove(&key(&[project, name]))
                .map(|_| ())
                .ok_or_else(|| not_found("subscription", name))
        }))
    }

    fn get_topic_policy<'a>(&'a self, topic: &'a str) -> ClientFuture<'a, IamPolicy> {
        ready(self.call("get_topic_policy", |state| {
            if !state.topics.contains_key(topic) {
                return Err(not_found("topic", topic));
            }
            Ok(state
                .resource_policies
                .get(topic)
                .cloned()
                .unwrap_or_default())
        }))
    }

    fn set_topic_policy<'a>(
        &'a self,
        topic: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy> {
        ready(self.call("set_topic_policy", |state| {
            if !state.topics.contains_key(topic) {
                return Err(not_found("topic", topic));
            }
            state
                .resource_policies
                .insert(topic.to_owned(), policy.clone());
            Ok(policy.clone())
        }))
    }
}

impl RegistryClient for FakeCloud {
    fn get_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Repository> {
        ready(self.call_in(project, "get_repository", |state| {
            state
                .repositories
                .get(&key(&[project, region, name]))
                .cloned()
                .ok_or_else(|| not_found("repository", name))
        }))
    }

    fn create_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "create_repository", |state| {
            let id = key(&[project, region, name]);
            if state.repositories.contains_key(&id) {
                return Err(already_exists("repository", name));
            }
            state.repositories.insert(
                id,
                Repository {
                    name: format!("projects/{project}/locations/{region}/repositories/{name}"),
                },
            );
            Ok(state.start_operation("create_repository", None))
        }))
    }

    fn delete_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_repository", |state| {
            state
                .repositories
                .remove(&key(&[project, region, name]))
                .ok_or_else(|| not_found("repository", name))?;
            Ok(state.start_operation("delete_repository", None))
        }))
    }
}

fn stored_service(state: &CloudState, project: &str, region: &str, spec: &ServiceSpec) -> Service {
    Service {
        name: format!("projects/{project}/locations/{region}/services/{}", spec.name),
        uri: state
            .service_uris
            .get(&spec.name)
            .cloned()
            .unwrap_or_else(|| format!("https://{}-fake.a.run.app", spec.name)),
        image: spec.image.clone(),
        min_instances: spec.min_instances,
        max_instances: spec.max_instances,
        env: spec.env.clone(),
        timeout_secs: spec.timeout_secs,
        service_account: spec.service_account.clone(),
        connector: spec.connector.clone(),
    }
}

impl ComputeClient for FakeCloud {
    fn get_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Service> {
        ready(self.call_in(project, "get_service", |state| {
            state
                .services
                .get(&key(&[project, region, name]))
                .cloned()
                .ok_or_else(|| not_found("service", name))
        }))
    }

    fn create_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ServiceSpec,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "create_service", |state| {
            let id = key(&[project, region, &spec.name]);
            if state.services.contains_key(&id) {
                return Err(already_exists("service", &spec.name));
            }
            let service = stored_service(state, project, region, spec);
            state.services.insert(id, service);
            Ok(state.start_operation("create_service", None))
        }))
    }

    fn update_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ServiceSpec,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "update_service", |state| {
            let id = key(&[project, region, &spec.name]);
            if !state.services.contains_key(&id) {
                return Err(not_found("service", &spec.name));
            }
            let service = stored_service(state, project, region, spec);
            state.services.insert(id, service);
            Ok(state.start_operation("update_service", None))
        }))
    }

    fn delete_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_service", |state| {
            let removed = state
                .services
                .remove(&key(&[project, region, name]))
                .ok_or_else(|| not_found("service", name))?;
            state.resource_policies.remove(&removed.name);
            Ok(state.start_operation("delete_service", None))
        }))
    }

    fn get_service_policy<'a>(&'a self, service: &'a str) -> ClientFuture<'a, IamPolicy> {
        ready(self.call("get_service_policy", |state| {
            Ok(state
                .resource_policies
                .get(service)
                .cloned()
                .unwrap_or_default())
        }))
    }

    fn set_service_policy<'a>(
        &'a self,
        service: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy> {
        ready(self.call("set_service_policy", |state| {
            state
                .resource_policies
                .insert(service.to_owned(), policy.clone());
            Ok(policy.clone())
        }))
    }
}

impl SchedulerClient for FakeCloud {
    fn get_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, SchedulerJob> {
        ready(self.call_in(project, "get_job", |state| {
            state
                .jobs
                .get(&key(&[project, region, name]))
                .cloned()
                .ok_or_else(|| not_found("job", name))
        }))
    }

    fn create_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a JobSpec,
    ) -> ClientFuture<'a, SchedulerJob> {
        ready(self.call_in(project, "create_job", |state| {
            let id = key(&[project, region, &spec.name]);
            if state.jobs.contains_key(&id) {
                return Err(already_exists("job", &spec.name));
            }
            let job = SchedulerJob {
                name: format!("projects/{project}/locations/{region}/jobs/{}", spec.name),
                schedule: spec.schedule.clone(),
            };
            state.jobs.insert(id, job.clone());
            Ok(job)
        }))
    }

    fn delete_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, ()> {
        ready(self.call_in(project, "delete_job", |state| {
            state
                .jobs
                .remove(&key(&[project, region, name]))
                .map(|_| ())
                .ok_or_else(|| not_found("job", name))
        }))
    }
}

impl LoggingClient for FakeCloud {
    fn get_sink<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, LogSink> {
        ready(self.call_in(project, "get_sink", |state| {
            state
                .sinks
                .get(&key(&[project, name]))
                .cloned()
                .ok_or_else(|| not_found("sink", name))
        }))
    }

    fn create_sink<'a>(
        &'a self,
        project: &'a str,
        spec: &'a SinkSpec,
    ) -> ClientFuture<'a, LogSink> {
        ready(self.call_in(project, "create_sink", |state| {
            let id = key(&[project, &spec.name]);
            if state.sinks.contains_key(&id) {
                return Err(already_exists("sink", &spec.name));
            }
            let sink = LogSink {
                name: spec.name.clone(),
                destination: spec.destination.clone(),
                writer_identity: format!(
                    "serviceAccount:service-{project}@gcp-sa-logging.iam.gserviceaccount.com"
                ),
            };
            state.sinks.insert(id, sink.clone());
            Ok(sink)
        }))
    }

    fn delete_sink<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, ()> {
        ready(self.call_in(project, "delete_sink", |state| {
            state
                .sinks
                .remove(&key(&[project, name]))
                .map(|_| ())
                .ok_or_else(|| not_found("sink", name))
        }))
    }
}

impl CloudState {
    fn store_manifest(&mut self, project: &str, spec: &DeploymentSpec) -> Deployment {
        let id = self.next_id();
        let manifest_name = format!("manifest-{id}");
        let deployment = Deployment {
            name: spec.name.clone(),
            fingerprint: format!("fp-{id}"),
            manifest: Some(format!(
                "https://www.googleapis.com/deploymentmanager/v2/projects/{project}/global/deployments/{}/manifests/{manifest_name}",
                spec.name
            )),
        };
        let manifest = Manifest {
            config: spec.config.clone(),
            layout: expand_layout(&spec.config),
        };
        let entry = self
            .deployments
            .entry(key(&[project, &spec.name]))
            .or_insert_with(|| DeploymentEntry {
                deployment: deployment.clone(),
                manifests: BTreeMap::new(),
            });
        entry.deployment = deployment.clone();
        entry.manifests.insert(manifest_name, manifest);
        deployment
    }
}

impl DeploymentClient for FakeCloud {
    fn get_deployment<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Deployment> {
        ready(self.call_in(project, "get_deployment", |state| {
            state
                .deployments
                .get(&key(&[project, name]))
                .map(|entry| entry.deployment.clone())
                .ok_or_else(|| not_found("deployment", name))
        }))
    }

    fn insert_deployment<'a>(
        &'a self,
        project: &'a str,
        spec: &'a DeploymentSpec,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "insert_deployment", |state| {
            if state.deployments.contains_key(&key(&[project, &spec.name])) {
                return Err(already_exists("deployment", &spec.name));
            }
            state.store_manifest(project, spec);
            Ok(state.start_operation("insert_deployment", None))
        }))
    }

    fn update_deployment<'a>(
        &'a self,
        project: &'a str,
        spec: &'a DeploymentSpec,
        fingerprint: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "update_deployment", |state| {
            let current = state
                .deployments
                .get(&key(&[project, &spec.name]))
                .ok_or_else(|| not_found("deployment", &spec.name))?;
            if current.deployment.fingerprint != fingerprint {
                return Err(ClientError::Api {
                    status: 412,
                    message: String::from("fingerprint mismatch"),
                });
            }
            state.store_manifest(project, spec);
            Ok(state.start_operation("update_deployment", None))
        }))
    }

    fn delete_deployment<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        ready(self.call_in(project, "delete_deployment", |state| {
            state
                .deployments
                .remove(&key(&[project, name]))
                .ok_or_else(|| not_found("deployment", name))?;
            Ok(state.start_operation("delete_deployment", None))
        }))
    }

    fn get_manifest<'a>(
        &'a self,
        project: &'a str,
        deployment: &'a str,
        manifest: &'a str,
    ) -> ClientFuture<'a, Manifest> {
        ready(self.call_in(project, "get_manifest", |state| {
            state
                .deployments
                .get(&key(&[project, deployment]))
                .and_then(|entry| entry.manifests.get(manifest))
                .cloned()
                .ok_or_else(|| not_found("manifest", manifest))
        }))
    }
}
