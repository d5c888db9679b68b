//! Unit tests for response classification and wire decoding.

use super::*;
use rstest::rstest;

use super::wire::{IndexListWire, ManifestWire, ProjectWire, ServiceWire};
use crate::project::clients::{IndexSpec, Manifest, ProjectInfo, Service};

#[rstest]
#[case(StatusCode::NOT_FOUND, "NotFound")]
#[case(StatusCode::FORBIDDEN, "PermissionDenied")]
#[case(StatusCode::CONFLICT, "AlreadyExists")]
#[case(StatusCode::INTERNAL_SERVER_ERROR, "Api")]
fn statuses_map_to_client_errors(#[case] status: StatusCode, #[case] expected: &str) {
    let body = br#"{"error":{"code":0,"message":"Resource 'x' was refused"}}"#;
    let err = classify(status, body);
    let kind = match &err {
        ClientError::NotFound(_) => "NotFound",
        ClientError::PermissionDenied(_) => "PermissionDenied",
        ClientError::AlreadyExists(_) => "AlreadyExists",
        ClientError::Api { .. } => "Api",
        ClientError::Transport(_) | ClientError::Decode(_) => "other",
    };
    assert_eq!(kind, expected);
    assert_eq!(err.message(), "Resource 'x' was refused");
}

#[rstest]
fn non_json_error_body_is_kept_verbatim() {
    let err = classify(StatusCode::BAD_GATEWAY, b"upstream unavailable\n");
    assert_eq!(
        err,
        ClientError::Api {
            status: 502,
            message: String::from("upstream unavailable"),
        }
    );
}

#[rstest]
fn longrunning_operation_refreshes_through_api_base() {
    let op = parse_operation(
        endpoints::RUN,
        br#"{"name":"projects/p/locations/r/operations/abc","done":false}"#,
    )
    .expect("operation should parse");
    assert!(!op.done);
    assert_eq!(
        op.poll_url,
        "https://run.googleapis.com/v2/projects/p/locations/r/operations/abc"
    );
}

#[rstest]
fn compute_operation_uses_self_link_and_status() {
    let body = br#"{
        "name": "operation-1",
        "status": "DONE",
        "selfLink": "https://compute.googleapis.com/compute/v1/projects/p/global/operations/operation-1",
        "error": {"errors": [{"code": "QUOTA", "message": "quota exceeded"}, {"message": "retry later"}]}
    }"#;
    let op = parse_operation(endpoints::COMPUTE, body).expect("operation should parse");
    assert!(op.done);
    assert!(op.poll_url.ends_with("/global/operations/operation-1"));
    assert_eq!(op.errors, vec!["quota exceeded", "retry later"]);
}

#[rstest]
fn longrunning_error_status_is_captured() {
    let op = parse_operation(
        endpoints::RESOURCE_MANAGER,
        br#"{"name":"operations/cp.1","done":true,"error":{"code":6,"message":"project id taken"}}"#,
    )
    .expect("operation should parse");
    assert!(op.done);
    assert_eq!(op.errors, vec!["project id taken"]);
}

#[rstest]
fn project_number_comes_from_resource_name() {
    let wire: ProjectWire = serde_json::from_str(
        r#"{"name":"projects/123456","projectId":"demo","displayName":"Demo","state":"ACTIVE"}"#,
    )
    .expect("project should parse");
    assert_eq!(
        ProjectInfo::from(wire),
        ProjectInfo {
            project_id: String::from("demo"),
            display_name: String::from("Demo"),
            number: String::from("123456"),
            state: String::from("ACTIVE"),
        }
    );
}

#[rstest]
fn service_reads_image_and_scaling() {
    let wire: ServiceWire = serde_json::from_str(
        r#"{
            "name": "projects/p/locations/r/services/orch",
            "uri": "https://orch-abc.a.run.app",
            "template": {
                "containers": [{"image": "gcr.io/p/orch:v1"}],
                "scaling": {"minInstanceCount": 1, "maxInstanceCount": 3}
            }
        }"#,
    )
    .expect("service should parse");
    let service = Service::from(wire);
    assert_eq!(service.image, "gcr.io/p/orch:v1");
    assert_eq!((service.min_instances, service.max_instances), (1, 3));
}

#[rstest]
fn service_reads_every_revision_input() {
    let wire: ServiceWire = serde_json::from_str(
        r#"{
            "name": "projects/p/locations/r/services/orch",
            "template": {
                "serviceAccount": "control@p.iam.gserviceaccount.com",
                "timeout": "300s",
                "vpcAccess": {"connector": "projects/p/locations/r/connectors/c"},
                "containers": [{
                    "image": "gcr.io/p/orch:v1",
                    "env": [{"name": "REGION", "value": "r"}]
                }]
            }
        }"#,
    )
    .expect("service should parse");
    let service = Service::from(wire);
    assert_eq!(service.timeout_secs, 300);
    assert_eq!(service.service_account, "control@p.iam.gserviceaccount.com");
    assert_eq!(
        service.connector.as_deref(),
        Some("projects/p/locations/r/connectors/c")
    );
    assert_eq!(service.env.get("REGION").map(String::as_str), Some("r"));
}

#[rstest]
fn listed_indexes_drop_implicit_name_field() {
    let wire: IndexListWire = serde_json::from_str(
        r#"{"indexes": [{
            "name": "projects/p/databases/(default)/collectionGroups/tasks/indexes/CICAg",
            "fields": [
                {"fieldPath": "status", "order": "ASCENDING"},
                {"fieldPath": "createdAt", "order": "ASCENDING"},
                {"fieldPath": "__name__", "order": "ASCENDING"}
            ]
        }]}"#,
    )
    .expect("index list should parse");
    let specs: Vec<IndexSpec> = wire
        .indexes
        .into_iter()
        .filter_map(wire::IndexWire::into_spec)
        .collect();
    assert_eq!(
        specs,
        vec![IndexSpec {
            collection: String::from("tasks"),
            fields: vec![String::from("status"), String::from("createdAt")],
        }]
    );
}

#[rstest]
fn manifest_without_config_reads_empty() {
    let wire: ManifestWire =
        serde_json::from_str(r#"{"layout": "resources: []\n"}"#).expect("manifest should parse");
    assert_eq!(
        Manifest::from(wire),
        Manifest {
            config: String::new(),
            layout: String::from("resources: []\n"),
        }
    );
}

#[rstest]
fn blank_token_is_rejected() {
    assert!(matches!(
        GcpRestClient::new("  "),
        Err(DeployError::Configuration(_))
    ));
    let client = GcpRestClient::new("ya29.token").expect("client should build");
    assert!(!format!("{client:?}").contains("ya29"));
}
