//! Unit tests for the project deployer, driven through the in-memory cloud.

use super::*;
use std::time::Duration;

use rstest::{fixture, rstest};

use crate::deployer::DEFAULT_TEMPLATE_VERSION;
use crate::template::DefaultTemplateResolver;
use crate::test_support::{FakeCloud, domain_of};

const PROJECT: &str = "demo-proj";
const REGION: &str = "us-central1";

#[fixture]
fn cloud() -> FakeCloud {
    FakeCloud::new()
        .with_project(PROJECT)
        .with_service_uri("backplane-orchestrator", "https://orch.example.run.app")
        .with_service_uri("backplane-event-processor", "https://events.example.run.app")
}

fn fast() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(1), Duration::from_millis(500))
}

fn deployer(cloud: &FakeCloud) -> ProjectDeployer<FakeCloud> {
    ProjectDeployer::from_client(
        Arc::new(cloud.clone()),
        REGION,
        Arc::new(DefaultTemplateResolver::new("https://templates.example.com")),
    )
    .with_poll_policy(fast(), fast())
}

fn options(name: &str, wait: bool) -> DeployOptions {
    DeployOptions::builder(name)
        .version(DEFAULT_TEMPLATE_VERSION)
        .wait(wait)
        .build()
        .expect("options should build")
}

fn destroy_options(name: &str) -> DestroyOptions {
    DestroyOptions::new(name).expect("destroy options should build")
}

#[rstest]
#[tokio::test]
async fn absent_project_without_wait_reports_create_in_progress() {
    let cloud = FakeCloud::new();
    let cancel = CancellationToken::new();

    let result = deployer(&cloud)
        .deploy(&cancel, &options("fresh-proj", false))
        .await
        .expect("deploy should submit");

    assert_eq!(result.operation, OperationType::Create);
    assert_eq!(result.status, DeployStatus::InProgress);
    assert!(result.outputs.is_empty());
    assert_eq!(cloud.count_calls("create_project"), 1);
    assert_eq!(cloud.count_calls("enable_services"), 0);
    assert_eq!(cloud.count_calls("get_service_account"), 0);
}

#[rstest]
#[tokio::test]
async fn absent_project_with_wait_creates_enables_and_converges() {
    let cloud = FakeCloud::new();
    let cancel = CancellationToken::new();

    let result = deployer(&cloud)
        .deploy(&cancel, &options("fresh-proj", true))
        .await
        .expect("deploy should complete");

    assert_eq!(result.operation, OperationType::Create);
    assert_eq!(result.status, DeployStatus::CreateComplete);
    assert!(!result.no_changes);
    assert!(cloud.has_project("fresh-proj"));
    assert_eq!(
        cloud.enabled_services("fresh-proj").len(),
        lifecycle::REQUIRED_SERVICES.len()
    );
    assert_eq!(
        cloud.project_labels("fresh-proj").get("managed-by").map(String::as_str),
        Some("backplane")
    );
    assert_eq!(
        result.outputs.get("projectId").map(String::as_str),
        Some("fresh-proj")
    );
}

#[rstest]
#[tokio::test]
async fn organization_option_becomes_parent() {
    let cloud = FakeCloud::new();
    let cancel = CancellationToken::new();
    let opts = DeployOptions::builder("org-proj")
        .organization_id(Some(String::from("123")))
        .build()
        .expect("options should build");

    let result = deployer(&cloud)
        .deploy(&cancel, &opts)
        .await
        .expect("create should be accepted under the organisation");

    assert_eq!(result.status, DeployStatus::CreateComplete);
    assert!(cloud.has_project("org-proj"));
}

#[rstest]
#[tokio::test]
async fn existing_project_converges_as_update(cloud: FakeCloud) {
    let cancel = CancellationToken::new();

    let result = deployer(&cloud)
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should complete");

    assert_eq!(result.operation, OperationType::Update);
    assert_eq!(result.status, DeployStatus::UpdateComplete);
    assert_eq!(cloud.count_calls("create_project"), 0);
    assert_eq!(
        result.outputs.get("orchestratorUrl").map(String::as_str),
        Some("https://orch.example.run.app")
    );
    assert_eq!(
        result.outputs.get("publicEndpoint").map(String::as_str),
        Some("https://orch.example.run.app")
    );
    assert_eq!(cloud.count_calls("insert_deployment"), 1);
}

#[rstest]
#[tokio::test]
async fn existing_project_gets_services_enabled(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    assert!(cloud.enabled_services(PROJECT).is_empty());

    deployer(&cloud)
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should enable services before converging");

    assert_eq!(cloud.count_calls("enable_services"), 1);
    assert_eq!(
        cloud.enabled_services(PROJECT).len(),
        lifecycle::REQUIRED_SERVICES.len()
    );
    let calls = cloud.calls();
    let enabled_at = calls
        .iter()
        .position(|call| call == "enable_services")
        .expect("services should be enabled");
    let first_resource_call = calls
        .iter()
        .position(|call| {
            domain_of(call).is_some_and(|domain| domain::CONVERGE_ORDER.contains(&domain))
        })
        .expect("resources should converge");
    assert!(enabled_at < first_resource_call);
}

#[rstest]
#[tokio::test]
async fn converge_without_enabled_services_fails(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let client = Arc::new(cloud.clone());
    let clients = ResourceClients::from_shared(&client);
    let config = ResourceConfig::new(PROJECT, REGION);
    let info = ProjectLifecycle::new(client.as_ref(), client.as_ref(), fast())
        .describe(&cancel, PROJECT)
        .await
        .expect("project should exist");

    let err = orchestrator::converge(&cancel, &clients, &config, &info, fast())
        .await
        .expect_err("disabled APIs should stop convergence");

    let DeployError::Converge { domain, .. } = err else {
        panic!("expected converge error, got {err:?}");
    };
    assert_eq!(domain, Domain::Identity);
}

#[rstest]
#[tokio::test]
async fn second_deploy_reports_no_changes(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let deployer = deployer(&cloud);
    let first = deployer
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("first deploy should complete");
    cloud.clear_calls();

    let second = deployer
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("second deploy should complete");

    assert_eq!(second.status, DeployStatus::NoChanges);
    assert!(second.no_changes);
    assert_eq!(second.outputs, first.outputs);
    for mutation in [
        "create_service_account",
        "insert_network",
        "create_topic",
        "create_service",
        "update_service",
        "set_service_policy",
        "create_subscription",
        "update_deployment",
        "insert_deployment",
    ] {
        assert_eq!(cloud.count_calls(mutation), 0, "{mutation} should not run");
    }
}

#[rstest]
#[tokio::test]
async fn changed_image_rolls_service_and_updates_record(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let deployer = deployer(&cloud);
    deployer
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("first deploy should complete");

    let opts = DeployOptions::builder(PROJECT)
        .parameter("orchestratorImage=gcr.io/demo/orch:v2")
        .build()
        .expect("options should build");
    let result = deployer
        .deploy(&cancel, &opts)
        .await
        .expect("second deploy should complete");

    assert_eq!(result.status, DeployStatus::UpdateComplete);
    assert_eq!(cloud.count_calls("update_service"), 1);
    assert_eq!(cloud.count_calls("update_deployment"), 1);
    let service = cloud
        .service(PROJECT, REGION, "backplane-orchestrator")
        .expect("service should exist");
    assert_eq!(service.image, "gcr.io/demo/orch:v2");
    assert_eq!(
        result.outputs.get("orchestratorImage").map(String::as_str),
        Some("gcr.io/demo/orch:v2")
    );
}

#[rstest]
#[tokio::test]
async fn domains_converge_in_fixed_order(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    deployer(&cloud)
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should complete");

    let sequence: Vec<Domain> = cloud
        .domain_sequence()
        .into_iter()
        .filter(|domain| domain::CONVERGE_ORDER.contains(domain))
        .collect();
    assert_eq!(sequence, domain::CONVERGE_ORDER.to_vec());
}

#[rstest]
#[tokio::test]
async fn converge_reads_identifiers_back(cloud: FakeCloud) {
    let cloud = cloud.with_services_enabled(PROJECT);
    let cancel = CancellationToken::new();
    let client = Arc::new(cloud.clone());
    let clients = ResourceClients::from_shared(&client);
    let config = ResourceConfig::new(PROJECT, REGION);
    let info = ProjectLifecycle::new(client.as_ref(), client.as_ref(), fast())
        .describe(&cancel, PROJECT)
        .await
        .expect("project should exist");

    let report = orchestrator::converge(&cancel, &clients, &config, &info, fast())
        .await
        .expect("converge should succeed");

    let resources = report.resources;
    assert_eq!(resources.project_number, info.number);
    assert_eq!(resources.orchestrator_url, "https://orch.example.run.app");
    assert_eq!(resources.event_processor_url, "https://events.example.run.app");
    assert_eq!(resources.task_events_topic, "projects/demo-proj/topics/task-events");
    assert_eq!(
        resources.control_topic.as_deref(),
        Some("projects/demo-proj/topics/control-events")
    );
    assert_eq!(
        resources.task_events_subscription,
        "projects/demo-proj/subscriptions/task-events-push"
    );
    assert_eq!(
        resources.crypto_key,
        "projects/demo-proj/locations/us-central1/keyRings/backplane-keyring/cryptoKeys/backplane-key"
    );
    assert_eq!(
        resources.runner_service_account,
        "backplane-runner@demo-proj.iam.gserviceaccount.com"
    );
    assert!(!report.changes.is_empty());

    let subscription = cloud
        .subscription(PROJECT, "task-events-push")
        .expect("subscription should exist");
    assert!(subscription.push_endpoint.starts_with("https://events.example.run.app"));
    let grant = cloud.resource_policy("projects/demo-proj/topics/log-events");
    assert!(grant.has_member(
        "roles/pubsub.publisher",
        "serviceAccount:service-demo-proj@gcp-sa-logging.iam.gserviceaccount.com"
    ));
}

#[rstest]
#[tokio::test]
async fn lost_creation_races_read_the_resource_back(cloud: FakeCloud) {
    let cloud = cloud.with_services_enabled(PROJECT);
    cloud.race_next("create_service_account");
    cloud.race_next("create_topic");
    let cancel = CancellationToken::new();
    let client = Arc::new(cloud.clone());
    let clients = ResourceClients::from_shared(&client);
    let config = ResourceConfig::new(PROJECT, REGION);
    let info = ProjectLifecycle::new(client.as_ref(), client.as_ref(), fast())
        .describe(&cancel, PROJECT)
        .await
        .expect("project should exist");

    let report = orchestrator::converge(&cancel, &clients, &config, &info, fast())
        .await
        .expect("lost races should not fail convergence");

    assert_eq!(
        report.resources.task_events_topic,
        format!("projects/{PROJECT}/topics/{}", config.task_events_topic)
    );
    assert!(cloud.count_calls("get_topic") >= 2);
    let raced_account = format!("service account {}", resources::CONTROL_ACCOUNT_ID);
    let raced_topic = format!("topic {}", config.task_events_topic);
    assert!(!report.changes.contains(&raced_account));
    assert!(!report.changes.contains(&raced_topic));
    assert!(
        report
            .changes
            .contains(&format!("topic {}", config.log_events_topic))
    );
}

#[rstest]
#[case(true, true)]
#[case(false, false)]
#[tokio::test]
async fn invocation_policy_follows_setting(
    cloud: FakeCloud,
    #[case] allow: bool,
    #[case] expect_public: bool,
) {
    let cancel = CancellationToken::new();
    deployer(&cloud)
        .with_allow_unauthenticated(allow)
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should complete");

    let policy = cloud.resource_policy(
        "projects/demo-proj/locations/us-central1/services/backplane-orchestrator",
    );
    assert_eq!(policy.has_member("roles/run.invoker", "allUsers"), expect_public);
}

#[rstest]
#[tokio::test]
async fn converge_failure_names_the_domain(cloud: FakeCloud) {
    cloud.fail_on(
        "create_topic",
        ClientError::Api {
            status: 500,
            message: String::from("backend error"),
        },
    );
    let cancel = CancellationToken::new();

    let err = deployer(&cloud)
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect_err("deploy should fail");

    let DeployError::Converge { domain, .. } = err else {
        panic!("expected converge error, got {err:?}");
    };
    assert_eq!(domain, Domain::Messaging);
    assert_eq!(cloud.count_calls("get_repository"), 0);
}

#[rstest]
#[tokio::test]
async fn url_template_is_rejected(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let opts = DeployOptions::builder(PROJECT)
        .template(Some(String::from("https://example.com/backend.jinja")))
        .build()
        .expect("options should build");

    let err = deployer(&cloud)
        .deploy(&cancel, &opts)
        .await
        .expect_err("URL templates are unsupported here");

    assert!(matches!(err, DeployError::Validation(_)));
    assert!(cloud.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn check_exists_reports_presence(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let deployer = deployer(&cloud);

    assert!(deployer.check_exists(&cancel, PROJECT).await.expect("lookup"));
    assert!(!deployer.check_exists(&cancel, "other-proj").await.expect("lookup"));
}

#[rstest]
#[tokio::test]
async fn destroy_of_absent_project_reports_not_found() {
    let cloud = FakeCloud::new();
    let cancel = CancellationToken::new();

    let result = deployer(&cloud)
        .destroy(&cancel, &destroy_options("ghost-proj"))
        .await
        .expect("destroy should succeed");

    assert!(result.not_found);
    assert_eq!(result.status, DeployStatus::NotFound);
    assert_eq!(cloud.count_calls("delete_project"), 0);
}

#[rstest]
#[tokio::test]
async fn destroy_removes_everything(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let deployer = deployer(&cloud);
    deployer
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should complete");

    let result = deployer
        .destroy(&cancel, &destroy_options(PROJECT))
        .await
        .expect("destroy should complete");

    assert_eq!(result.status, DeployStatus::DeleteComplete);
    assert!(!cloud.has_project(PROJECT));
    assert_eq!(cloud.resource_count(), 0);
}

#[rstest]
#[tokio::test]
async fn destroy_is_best_effort(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let deployer = deployer(&cloud);
    deployer
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should complete");
    cloud.fail_on(
        "delete_topic",
        ClientError::Api {
            status: 500,
            message: String::from("topic stuck"),
        },
    );
    cloud.clear_calls();

    let err = deployer
        .destroy(&cancel, &destroy_options(PROJECT))
        .await
        .expect_err("destroy should report the failure");

    let DeployError::Teardown { failures } = err else {
        panic!("expected teardown error, got {err:?}");
    };
    let domains: Vec<Domain> = failures.iter().map(|failure| failure.domain).collect();
    assert_eq!(domains, vec![Domain::Messaging]);
    for later in [
        "destroy_key_versions",
        "delete_database",
        "delete_network",
        "delete_service_account",
        "delete_deployment",
        "delete_project",
    ] {
        assert!(cloud.count_calls(later) > 0, "{later} should still run");
    }
}

#[rstest]
#[tokio::test]
async fn teardown_walks_reverse_order(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let deployer = deployer(&cloud);
    deployer
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should complete");
    cloud.clear_calls();

    deployer
        .destroy(&cancel, &destroy_options(PROJECT))
        .await
        .expect("destroy should complete");

    let sequence: Vec<Domain> = cloud
        .calls()
        .iter()
        .filter_map(|call| domain_of(call))
        .filter(|domain| domain::TEARDOWN_ORDER.contains(domain))
        .fold(Vec::new(), |mut seen, domain| {
            if seen.last() != Some(&domain) {
                seen.push(domain);
            }
            seen
        });
    assert_eq!(sequence, domain::TEARDOWN_ORDER.to_vec());
}

#[rstest]
#[tokio::test]
async fn outputs_read_the_record(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    let deployer = deployer(&cloud);
    let deployed = deployer
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect("deploy should complete");

    let first = deployer.outputs(&cancel, PROJECT).await.expect("outputs");
    let second = deployer.outputs(&cancel, PROJECT).await.expect("outputs");

    assert_eq!(first, second);
    assert_eq!(first, deployed.outputs);
    assert_eq!(first.get("minInstances").map(String::as_str), Some("0"));
    assert_eq!(first.get("allowUnauthenticated").map(String::as_str), Some("false"));
}

#[rstest]
#[tokio::test]
async fn outputs_without_record_is_not_found(cloud: FakeCloud) {
    let cancel = CancellationToken::new();

    let err = deployer(&cloud)
        .outputs(&cancel, PROJECT)
        .await
        .expect_err("no record yet");

    assert!(matches!(err, DeployError::NotFound { .. }));
}

#[rstest]
#[tokio::test]
async fn cancelled_deploy_stops_before_converging(cloud: FakeCloud) {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = deployer(&cloud)
        .deploy(&cancel, &options(PROJECT, true))
        .await
        .expect_err("deploy should be cancelled");

    assert!(err.is_cancelled());
    assert_eq!(cloud.count_calls("create_service_account"), 0);
}
