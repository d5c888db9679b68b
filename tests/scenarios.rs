//! End-to-end deployer scenarios run against both providers' fakes.

mod common;

use std::sync::Arc;

use backplane::project::clients::ResourceClients;
use backplane::project::lifecycle::ProjectLifecycle;
use backplane::project::orchestrator;
use backplane::project::resources::{RUNNER_ACCOUNT_ID, ResourceConfig};
use backplane::test_support::{FakeCloud, FakeStacks};
use backplane::{DeployOptions, DeployStatus, Deployer, DestroyOptions, OperationType};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use common::{PROJECT_REGION, fast, project_deployer, stack_deployer};

fn deploy_options(name: &str, wait: bool) -> DeployOptions {
    DeployOptions::builder(name)
        .parameter("Env=dev")
        .wait(wait)
        .build()
        .expect("options should build")
}

fn fresh_deployer(provider: &str) -> Box<dyn Deployer> {
    match provider {
        "aws" => Box::new(stack_deployer(&FakeStacks::new())),
        _ => Box::new(project_deployer(&FakeCloud::new())),
    }
}

#[rstest]
#[case::stack("aws")]
#[case::project("gcp")]
#[tokio::test]
async fn deploy_without_wait_on_absent_target_is_in_progress(#[case] provider: &str) {
    let cancel = CancellationToken::new();
    let deployer = fresh_deployer(provider);

    let result = deployer
        .deploy(&cancel, &deploy_options("scenario-a", false))
        .await
        .expect("deploy should submit");

    assert_eq!(result.status, DeployStatus::InProgress);
    assert_eq!(result.operation, OperationType::Create);
    assert!(!result.no_changes);
}

#[rstest]
#[tokio::test]
async fn unchanged_stack_reports_no_changes() {
    let cancel = CancellationToken::new();
    let stacks = FakeStacks::new().with_outputs(&[("ApiUrl", "https://api.example.com")]);
    let deployer = stack_deployer(&stacks);
    deployer
        .deploy(&cancel, &deploy_options("scenario-b", true))
        .await
        .expect("first deploy should complete");

    let result = deployer
        .deploy(&cancel, &deploy_options("scenario-b", true))
        .await
        .expect("second deploy should succeed");

    assert_eq!(result.status, DeployStatus::NoChanges);
    assert_eq!(result.operation, OperationType::Update);
    assert!(result.no_changes);
    assert_eq!(stacks.count_calls("create_stack"), 1);
    assert_eq!(stacks.count_calls("update_stack"), 1);
}

#[rstest]
#[tokio::test]
async fn unchanged_project_reports_no_changes() {
    let cancel = CancellationToken::new();
    let cloud = FakeCloud::new().with_project("scenario-b");
    let deployer = project_deployer(&cloud);
    deployer
        .deploy(&cancel, &deploy_options("scenario-b", true))
        .await
        .expect("first deploy should complete");
    let resources_after_first = cloud.resource_count();

    let result = deployer
        .deploy(&cancel, &deploy_options("scenario-b", true))
        .await
        .expect("second deploy should succeed");

    assert_eq!(result.status, DeployStatus::NoChanges);
    assert_eq!(result.operation, OperationType::Update);
    assert!(result.no_changes);
    assert_eq!(cloud.resource_count(), resources_after_first);
}

#[rstest]
#[case::stack("aws")]
#[case::project("gcp")]
#[tokio::test]
async fn destroy_of_absent_target_is_not_found(#[case] provider: &str) {
    let cancel = CancellationToken::new();
    let deployer = fresh_deployer(provider);
    let options = DestroyOptions::new("scenario-c").expect("options should build");

    let result = deployer
        .destroy(&cancel, &options)
        .await
        .expect("destroy of absent target should succeed");

    assert_eq!(result.status, DeployStatus::NotFound);
    assert!(result.not_found);
    assert_eq!(result.name, "scenario-c");
}

#[rstest]
#[tokio::test]
async fn full_convergence_reports_what_was_created() {
    const PROJECT: &str = "scenario-d";
    let cancel = CancellationToken::new();
    let cloud = FakeCloud::new()
        .with_project(PROJECT)
        .with_services_enabled(PROJECT)
        .with_service_uri("backplane-orchestrator", "https://orch.example.run.app")
        .with_service_uri("backplane-event-processor", "https://events.example.run.app");
    let client = Arc::new(cloud.clone());
    let clients = ResourceClients::from_shared(&client);
    let config = ResourceConfig::new(PROJECT, PROJECT_REGION);
    let info = ProjectLifecycle::new(client.as_ref(), client.as_ref(), fast())
        .describe(&cancel, PROJECT)
        .await
        .expect("project should exist");
    assert_eq!(cloud.resource_count(), 0);

    let report = orchestrator::converge(&cancel, &clients, &config, &info, fast())
        .await
        .expect("converge should succeed");
    let resources = report.resources;

    assert_eq!(resources.project_id, PROJECT);
    assert_eq!(resources.project_number, info.number);
    assert_eq!(resources.region, PROJECT_REGION);
    let orchestrator_service = cloud
        .service(PROJECT, PROJECT_REGION, &config.orchestrator_service)
        .expect("orchestrator service should be created");
    assert_eq!(resources.orchestrator_url, orchestrator_service.uri);
    let events_service = cloud
        .service(PROJECT, PROJECT_REGION, &config.event_processor_service)
        .expect("event processor should be created");
    assert_eq!(resources.event_processor_url, events_service.uri);
    let subscription = cloud
        .subscription(PROJECT, &config.task_events_subscription)
        .expect("subscription should be created");
    assert_eq!(resources.task_events_subscription, subscription.name);
    assert_eq!(resources.task_events_topic, subscription.topic);
    assert_eq!(
        resources.runner_service_account,
        config.account_email(RUNNER_ACCOUNT_ID)
    );
    assert!(cloud.resource_count() > 0);
    assert!(!report.changes.is_empty());
}
