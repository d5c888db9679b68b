//! Deployment record payload and manifest layout parsing.
//!
//! After convergence the project path records what it applied as a
//! declarative deployment: one imported template plus one resource whose
//! properties describe the backend. The built-in template echoes every
//! property back as an output, so reading the expanded layout later yields
//! the backend's identifiers without re-querying every domain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::DeployError;

use super::clients::DeploymentSpec;
use super::resources::{BackendResources, ResourceConfig};

/// Name of the deployment holding the record.
pub const DEPLOYMENT_NAME: &str = "backplane-backend";
/// Import path of the record template.
pub const TEMPLATE_IMPORT: &str = "backend.jinja";
/// Name of the single resource block in the record.
pub const RESOURCE_NAME: &str = "backend";
/// Built-in record template.
pub const BUILTIN_TEMPLATE: &str = include_str!("../../templates/backend-record.jinja");

/// Properties recorded for a converged backend.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProperties {
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
    /// Subnet primary range.
    pub subnet_cidr: String,
    /// Connector name.
    pub vpc_connector_name: String,
    /// Connector range.
    pub vpc_connector_cidr: String,
    /// Firewall rule name.
    pub firewall_name: String,
    /// Firestore location id.
    pub firestore_location_id: String,
    /// Control-plane image.
    pub orchestrator_image: String,
    /// Event-relay image.
    pub event_processor_image: String,
    /// Control-plane service name.
    pub orchestrator_service_name: String,
    /// Event-relay service name.
    pub event_processor_service_name: String,
    /// Control-plane URL.
    pub orchestrator_url: String,
    /// Event-relay URL.
    pub event_processor_url: String,
    /// Public endpoint alias.
    pub public_endpoint: String,
    /// Minimum instances.
    pub min_instances: u32,
    /// Maximum instances.
    pub max_instances: u32,
    /// Request timeout in seconds.
    pub request_timeout_seconds: u32,
    /// Whether the control plane accepts unauthenticated calls.
    pub allow_unauthenticated: bool,
    /// Task-events topic id.
    pub task_events_topic: String,
    /// Task-events topic full name.
    pub task_events_topic_path: String,
    /// Log-events topic id.
    pub log_events_topic: String,
    /// Log-events topic full name.
    pub log_events_topic_path: String,
    /// Control topic id, empty when not configured.
    pub control_topic: String,
    /// Control topic full name, empty when not configured.
    pub control_topic_path: String,
    /// Push subscription id.
    pub task_events_subscription: String,
    /// Push subscription full name.
    pub task_events_subscription_path: String,
    /// Repository id.
    pub repository_name: String,
    /// Repository full name.
    pub repository_path: String,
    /// Key ring id.
    pub key_ring_name: String,
    /// Key ring full name.
    pub key_ring_path: String,
    /// Crypto key id.
    pub crypto_key_name: String,
    /// Crypto key full name.
    pub crypto_key_path: String,
    /// Scheduler job id.
    pub scheduler_job_name: String,
    /// Scheduler job full name.
    pub scheduler_job_path: String,
    /// Health schedule expression.
    pub health_schedule: String,
    /// Health reconciliation path.
    pub health_path: String,
    /// Log sink name.
    pub log_sink_name: String,
    /// Log retention in days.
    pub log_retention_days: u32,
    /// Control-plane service account.
    pub control_service_account: String,
    /// Event-relay service account.
    pub events_service_account: String,
    /// Runner service account.
    pub runner_service_account: String,
}

impl RecordProperties {
    /// Combines desired configuration with the identifiers read back.
    #[must_use]
    pub fn new(config: &ResourceConfig, resources: &BackendResources) -> Self {
        Self {
            project_id: resources.project_id.clone(),
            project_number: resources.project_number.clone(),
            region: resources.region.clone(),
            vpc_name: resources.vpc_name.clone(),
            subnet_name: resources.subnet_name.clone(),
            subnet_cidr: config.subnet_cidr.clone(),
            vpc_connector_name: resources.connector_name.clone(),
            vpc_connector_cidr: config.connector_cidr.clone(),
            firewall_name: config.firewall_name.clone(),
            firestore_location_id: resources.firestore_location.clone(),
            orchestrator_image: config.orchestrator_image.clone(),
            event_processor_image: config.event_processor_image.clone(),
            orchestrator_service_name: config.orchestrator_service.clone(),
            event_processor_service_name: config.event_processor_service.clone(),
            orchestrator_url: resources.orchestrator_url.clone(),
            event_processor_url: resources.event_processor_url.clone(),
            public_endpoint: resources.public_endpoint.clone(),
            min_instances: config.min_instances,
            max_instances: config.max_instances,
            request_timeout_seconds: config.request_timeout_secs,
            allow_unauthenticated: config.allow_unauthenticated,
            task_events_topic: config.task_events_topic.clone(),
            task_events_topic_path: resources.task_events_topic.clone(),
            log_events_topic: config.log_events_topic.clone(),
            log_events_topic_path: resources.log_events_topic.clone(),
            control_topic: config.control_topic.clone().unwrap_or_default(),
            control_topic_path: resources.control_topic.clone().unwrap_or_default(),
            task_events_subscription: config.task_events_subscription.clone(),
            task_events_subscription_path: resources.task_events_subscription.clone(),
            repository_name: config.repository_name.clone(),
            repository_path: resources.repository.clone(),
            key_ring_name: config.key_ring_name.clone(),
            key_ring_path: resources.key_ring.clone(),
            crypto_key_name: config.crypto_key_name.clone(),
            crypto_key_path: resources.crypto_key.clone(),
            scheduler_job_name: config.scheduler_job_name.clone(),
            scheduler_job_path: resources.scheduler_job.clone(),
            health_schedule: config.health_schedule.clone(),
            health_path: config.health_path.clone(),
            log_sink_name: config.log_sink_name.clone(),
            log_retention_days: config.log_retention_days,
            control_service_account: resources.control_service_account.clone(),
            events_service_account: resources.events_service_account.clone(),
            runner_service_account: resources.runner_service_account.clone(),
        }
    }

    /// Flattens the properties the way the record template echoes them.
    #[must_use]
    pub fn to_outputs(&self) -> BTreeMap<String, String> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(fields)) => fields
                .into_iter()
                .map(|(key, value)| {
                    let rendered = match value {
                        serde_json::Value::String(text) => text,
                        other => other.to_string(),
                    };
                    (key, rendered)
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

#[derive(Serialize)]
struct ConfigDocument<'a> {
    imports: Vec<Import<'a>>,
    resources: Vec<ResourceBlock<'a>>,
}

#[derive(Serialize)]
struct Import<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct ResourceBlock<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    properties: &'a RecordProperties,
}

/// Renders the configuration document for `properties`.
///
/// # Errors
///
/// Returns [`DeployError::Validation`] when serialization fails.
pub fn render_config(properties: &RecordProperties) -> Result<String, DeployError> {
    let document = ConfigDocument {
        imports: vec![Import {
            path: TEMPLATE_IMPORT,
        }],
        resources: vec![ResourceBlock {
            name: RESOURCE_NAME,
            kind: TEMPLATE_IMPORT,
            properties,
        }],
    };
    serde_yaml::to_string(&document).map_err(|err| {
        DeployError::Validation(format!("cannot render deployment record: {err}"))
    })
}

/// Builds the deployment request for a rendered config and template body.
#[must_use]
pub fn record_spec(config: String, template_body: &str) -> DeploymentSpec {
    DeploymentSpec {
        name: DEPLOYMENT_NAME.to_owned(),
        config,
        imports: BTreeMap::from([(TEMPLATE_IMPORT.to_owned(), template_body.to_owned())]),
    }
}

#[derive(Deserialize)]
struct Layout {
    #[serde(default)]
    resources: Vec<LayoutResource>,
}

#[derive(Deserialize)]
struct LayoutResource {
    #[serde(default)]
    outputs: Vec<LayoutOutput>,
    #[serde(default)]
    resources: Vec<LayoutResource>,
}

#[derive(Deserialize)]
struct LayoutOutput {
    name: String,
    #[serde(rename = "finalValue", default)]
    final_value: Value,
}

/// Extracts every output declared in a manifest layout, coercing values to
/// strings. Nested resources contribute their outputs too; a later
/// duplicate name replaces an earlier one.
///
/// # Errors
///
/// Returns [`DeployError::OperationFailed`] when the layout cannot be
/// parsed.
pub fn parse_layout_outputs(layout: &str) -> Result<BTreeMap<String, String>, DeployError> {
    if layout.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: Layout =
        serde_yaml::from_str(layout).map_err(|err| DeployError::OperationFailed {
            operation: String::from("read deployment manifest"),
            message: format!("malformed layout: {err}"),
        })?;
    let mut outputs = BTreeMap::new();
    collect_outputs(&parsed.resources, &mut outputs);
    Ok(outputs)
}

fn collect_outputs(resources: &[LayoutResource], into: &mut BTreeMap<String, String>) {
    for resource in resources {
        for output in &resource.outputs {
            into.insert(output.name.clone(), coerce(&output.final_value));
        }
        collect_outputs(&resource.resources, into);
    }
}

fn coerce(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_properties() -> RecordProperties {
        let config = ResourceConfig::new("demo-proj", "europe-west1");
        let resources = BackendResources {
            project_id: String::from("demo-proj"),
            project_number: String::from("1234"),
            region: String::from("europe-west1"),
            orchestrator_url: String::from("https://orch.example"),
            ..BackendResources::default()
        };
        RecordProperties::new(&config, &resources)
    }

    #[rstest]
    fn config_document_has_one_import_and_one_resource() {
        let rendered = render_config(&sample_properties()).expect("render");
        let parsed: Value = serde_yaml::from_str(&rendered).expect("reparse");
        let imports = parsed.get("imports").and_then(Value::as_sequence).expect("imports");
        let resources = parsed
            .get("resources")
            .and_then(Value::as_sequence)
            .expect("resources");
        assert_eq!(imports.len(), 1);
        assert_eq!(resources.len(), 1);
        let block = resources.first().expect("resource block");
        assert_eq!(block.get("type").and_then(Value::as_str), Some(TEMPLATE_IMPORT));
        let properties = block.get("properties").expect("properties");
        assert_eq!(
            properties.get("projectId").and_then(Value::as_str),
            Some("demo-proj")
        );
        assert_eq!(
            properties.get("vpcConnectorName").and_then(Value::as_str),
            Some("")
        );
        assert_eq!(properties.get("maxInstances").and_then(Value::as_u64), Some(10));
    }

    #[rstest]
    fn rendering_is_deterministic() {
        let properties = sample_properties();
        assert_eq!(
            render_config(&properties).expect("first"),
            render_config(&properties).expect("second")
        );
    }

    #[rstest]
    fn outputs_match_echoed_layout_values() {
        let outputs = sample_properties().to_outputs();
        assert_eq!(outputs.get("projectId").map(String::as_str), Some("demo-proj"));
        assert_eq!(outputs.get("minInstances").map(String::as_str), Some("0"));
        assert_eq!(
            outputs.get("allowUnauthenticated").map(String::as_str),
            Some("false")
        );
        assert_eq!(outputs.get("controlTopic").map(String::as_str), Some("control-events"));
    }

    #[rstest]
    fn record_spec_embeds_template() {
        let spec = record_spec(String::from("resources: []\n"), BUILTIN_TEMPLATE);
        assert_eq!(spec.name, DEPLOYMENT_NAME);
        assert_eq!(
            spec.imports.get(TEMPLATE_IMPORT).map(String::as_str),
            Some(BUILTIN_TEMPLATE)
        );
    }

    #[rstest]
    fn layout_outputs_are_coerced_to_strings() {
        let layout = "\
resources:
- name: backend
  type: backend.jinja
  outputs:
  - name: projectId
    finalValue: demo-proj
  - name: maxInstances
    finalValue: 10
  - name: allowUnauthenticated
    finalValue: false
  - name: controlTopic
    finalValue: null
  resources:
  - name: nested
    outputs:
    - name: tags
      finalValue: [a, b]
";
        let outputs = parse_layout_outputs(layout).expect("parse");
        assert_eq!(outputs.get("projectId").map(String::as_str), Some("demo-proj"));
        assert_eq!(outputs.get("maxInstances").map(String::as_str), Some("10"));
        assert_eq!(
            outputs.get("allowUnauthenticated").map(String::as_str),
            Some("false")
        );
        assert_eq!(outputs.get("controlTopic").map(String::as_str), Some(""));
        assert_eq!(outputs.get("tags").map(String::as_str), Some(r#"["a","b"]"#));
    }

    #[rstest]
    #[case("")]
    #[case("resources: []\n")]
    fn empty_layouts_yield_no_outputs(#[case] layout: &str) {
        assert!(parse_layout_outputs(layout).expect("parse").is_empty());
    }

    #[rstest]
    fn malformed_layout_is_an_operation_failure() {
        let err = parse_layout_outputs("resources: {oops").expect_err("malformed");
        assert!(matches!(err, DeployError::OperationFailed { .. }));
    }
}
