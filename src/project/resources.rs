//! Desired configuration of a project backend and the identifiers read back
//! after convergence.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::DeployError;

/// Override key for the control-plane image.
pub const ORCHESTRATOR_IMAGE_KEY: &str = "orchestratorImage";
/// Override key for the event-relay image.
pub const EVENT_PROCESSOR_IMAGE_KEY: &str = "eventProcessorImage";
/// Override key for the minimum instance count.
pub const MIN_INSTANCES_KEY: &str = "minInstances";
/// Override key for the maximum instance count.
pub const MAX_INSTANCES_KEY: &str = "maxInstances";
/// Override key for the Firestore location.
pub const FIRESTORE_LOCATION_KEY: &str = "firestoreLocation";

/// Service account ids created by the identity domain.
pub const CONTROL_ACCOUNT_ID: &str = "backplane-control";
/// Service account driving event relay and push delivery.
pub const EVENTS_ACCOUNT_ID: &str = "backplane-events";
/// Service account task runners execute as.
pub const RUNNER_ACCOUNT_ID: &str = "backplane-runner";

/// Desired state of a project backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceConfig {
    /// Project id.
    pub project_id: String,
    /// Region for every regional resource.
    pub region: String,
    /// VPC name.
    pub vpc_name: String,
    /// Subnet name.
    pub subnet_name: String,
    /// Subnet primary range.
    pub subnet_cidr: String,
    /// Serverless connector name.
    pub connector_name: String,
    /// Serverless connector range.
    pub connector_cidr: String,
    /// Egress firewall rule name.
    pub firewall_name: String,
    /// Firestore location id.
    pub firestore_location: String,
    /// Control-plane image.
    pub orchestrator_image: String,
    /// Event-relay image.
    pub event_processor_image: String,
    /// Control-plane service name.
    pub orchestrator_service: String,
    /// Event-relay service name.
    pub event_processor_service: String,
    /// Minimum instances per service.
    pub min_instances: u32,
    /// Maximum instances per service.
    pub max_instances: u32,
    /// Request timeout in seconds.
    pub request_timeout_secs: u32,
    /// Topic carrying task lifecycle events.
    pub task_events_topic: String,
    /// Topic receiving exported logs.
    pub log_events_topic: String,
    /// Optional control topic.
    pub control_topic: Option<String>,
    /// Push subscription on the task-events topic.
    pub task_events_subscription: String,
    /// Artifact Registry repository.
    pub repository_name: String,
    /// KMS key ring name.
    pub key_ring_name: String,
    /// KMS crypto key name.
    pub crypto_key_name: String,
    /// Scheduler job name.
    pub scheduler_job_name: String,
    /// Cron expression of the health-reconciliation job.
    pub health_schedule: String,
    /// Path invoked by the health-reconciliation job.
    pub health_path: String,
    /// Log sink name.
    pub log_sink_name: String,
    /// Log retention in days.
    pub log_retention_days: u32,
    /// Labels applied to labelled resources.
    pub labels: BTreeMap<String, String>,
    /// Whether the control-plane service accepts unauthenticated calls.
    pub allow_unauthenticated: bool,
}

impl ResourceConfig {
    /// Builds the default configuration for `project_id` in `region`.
    #[must_use]
    pub fn new(project_id: &str, region: &str) -> Self {
        let repository_name = String::from("backplane");
        let image = |component: &str| {
            format!("{region}-docker.pkg.dev/{project_id}/{repository_name}/{component}:latest")
        };
        let orchestrator_image = image("orchestrator");
        let event_processor_image = image("event-processor");
        Self {
            project_id: project_id.to_owned(),
            region: region.to_owned(),
            vpc_name: String::from("backplane-vpc"),
            subnet_name: String::from("backplane-subnet"),
            subnet_cidr: String::from("10.10.0.0/24"),
            connector_name: String::from("backplane-connector"),
            connector_cidr: String::from("10.8.0.0/28"),
            firewall_name: String::from("backplane-allow-egress"),
            firestore_location: region.to_owned(),
            orchestrator_image,
            event_processor_image,
            orchestrator_service: String::from("backplane-orchestrator"),
            event_processor_service: String::from("backplane-event-processor"),
            min_instances: 0,
            max_instances: 10,
            request_timeout_secs: 300,
            task_events_topic: String::from("task-events"),
            log_events_topic: String::from("log-events"),
            control_topic: Some(String::from("control-events")),
            task_events_subscription: String::from("task-events-push"),
            repository_name,
            key_ring_name: String::from("backplane-keyring"),
            crypto_key_name: String::from("backplane-key"),
            scheduler_job_name: String::from("backplane-health-reconcile"),
            health_schedule: String::from("*/5 * * * *"),
            health_path: String::from("/internal/health/reconcile"),
            log_sink_name: String::from("backplane-log-sink"),
            log_retention_days: 30,
            labels: BTreeMap::from([(String::from("managed-by"), String::from("backplane"))]),
            allow_unauthenticated: false,
        }
    }

    /// Sets whether the control-plane service accepts unauthenticated calls.
    #[must_use]
    pub const fn with_allow_unauthenticated(mut self, allow: bool) -> Self {
        self.allow_unauthenticated = allow;
        self
    }

    /// Applies recognised parameter overrides. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Validation`] when an instance bound is not a
    /// decimal integer or the bounds are inverted.
    pub fn with_overrides(mut self, params: &BTreeMap<String, String>) -> Result<Self, DeployError> {
        if let Some(image) = non_empty(params, ORCHESTRATOR_IMAGE_KEY) {
            self.orchestrator_image = image.to_owned();
        }
        if let Some(image) = non_empty(params, EVENT_PROCESSOR_IMAGE_KEY) {
            self.event_processor_image = image.to_owned();
        }
        if let Some(location) = non_empty(params, FIRESTORE_LOCATION_KEY) {
            self.firestore_location = location.to_owned();
        }
        if let Some(raw) = non_empty(params, MIN_INSTANCES_KEY) {
            self.min_instances = parse_count(MIN_INSTANCES_KEY, raw)?;
        }
        if let Some(raw) = non_empty(params, MAX_INSTANCES_KEY) {
            self.max_instances = parse_count(MAX_INSTANCES_KEY, raw)?;
        }
        if self.min_instances > self.max_instances {
            return Err(DeployError::Validation(format!(
                "{MIN_INSTANCES_KEY} ({}) exceeds {MAX_INSTANCES_KEY} ({})",
                self.min_instances, self.max_instances
            )));
        }
        Ok(self)
    }

    /// Every topic the messaging domain manages, in creation order.
    #[must_use]
    pub fn topics(&self) -> Vec<&str> {
        let mut topics = vec![self.task_events_topic.as_str(), self.log_events_topic.as_str()];
        if let Some(control) = self.control_topic.as_deref() {
            topics.push(control);
        }
        topics
    }

    /// Email of a service account created by the identity domain.
    #[must_use]
    pub fn account_email(&self, account_id: &str) -> String {
        format!("{account_id}@{}.iam.gserviceaccount.com", self.project_id)
    }
}

fn non_empty<'a>(params: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_count(key: &str, raw: &str) -> Result<u32, DeployError> {
    raw.parse::<u32>().map_err(|_| {
        DeployError::Validation(format!(
            "parameter {key} must be a non-negative decimal integer, got '{raw}'"
        ))
    })
}

/// Identifiers read back after convergence.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResources {
    /// Project id.
    pub project_id: String,
    /// Numeric project number.
    pub project_number: String,
    /// Region.
    pub region: String,
    /// VPC name.
    pub vpc_name: String,
    /// Subnet name.
    pub subnet_name: String,
    /// Full connector name.
    pub connector_name: String,
    /// Firestore location id.
    pub firestore_location: String,
    /// Control-plane service URL.
    pub orchestrator_url: String,
    /// Event-relay service URL.
    pub event_processor_url: String,
    /// Full name of the task-events topic.
    pub task_events_topic: String,
    /// Full name of the log-events topic.
    pub log_events_topic: String,
    /// Full name of the control topic, when configured.
    pub control_topic: Option<String>,
    /// Full name of the push subscription.
    pub task_events_subscription: String,
    /// Full key ring name.
    pub key_ring: String,
    /// Full crypto key name.
    pub crypto_key: String,
    /// Full scheduler job name.
    pub scheduler_job: String,
    /// Control-plane service account email.
    pub control_service_account: String,
    /// Event-relay service account email.
    pub events_service_account: String,
    /// Runner service account email.
    pub runner_service_account: String,
    /// Full registry repository name.
    pub repository: String,
    /// Public endpoint alias (the control-plane URL).
    pub public_endpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[rstest]
    fn defaults_derive_images_from_registry() {
        let config = ResourceConfig::new("proj-1", "europe-west1");
        assert_eq!(
            config.orchestrator_image,
            "europe-west1-docker.pkg.dev/proj-1/backplane/orchestrator:latest"
        );
        assert_eq!(config.firestore_location, "europe-west1");
        assert_eq!(config.topics(), vec!["task-events", "log-events", "control-events"]);
    }

    #[rstest]
    fn overrides_replace_recognised_keys() {
        let config = ResourceConfig::new("proj-1", "us-central1")
            .with_overrides(&params(&[
                ("orchestratorImage", "gcr.io/x/orch:v2"),
                ("minInstances", "1"),
                ("maxInstances", "4"),
                ("firestoreLocation", "nam5"),
                ("unrelated", "ignored"),
            ]))
            .expect("overrides should apply");
        assert_eq!(config.orchestrator_image, "gcr.io/x/orch:v2");
        assert_eq!((config.min_instances, config.max_instances), (1, 4));
        assert_eq!(config.firestore_location, "nam5");
    }

    #[rstest]
    #[case("minInstances", "two")]
    #[case("maxInstances", "-1")]
    #[case("maxInstances", "3.5")]
    fn malformed_counts_are_rejected(#[case] key: &str, #[case] value: &str) {
        let err = ResourceConfig::new("proj-1", "us-central1")
            .with_overrides(&params(&[(key, value)]))
            .expect_err("override should be rejected");
        let DeployError::Validation(message) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(message.contains(key) && message.contains(value), "{message}");
    }

    #[rstest]
    fn inverted_bounds_are_rejected() {
        let result = ResourceConfig::new("proj-1", "us-central1")
            .with_overrides(&params(&[("minInstances", "5"), ("maxInstances", "2")]));
        assert!(matches!(result, Err(DeployError::Validation(_))));
    }
}
