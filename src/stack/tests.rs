//! Unit tests for the templated-stack deployer.

use super::*;
use std::time::Duration;

use rstest::{fixture, rstest};

use crate::template::{DefaultTemplateResolver, TemplateSource};
use crate::test_support::FakeStacks;

const STACK: &str = "backplane-dev";

#[fixture]
fn stacks() -> FakeStacks {
    FakeStacks::new().with_outputs(&[("ApiUrl", "https://api.example.com"), ("Bucket", "b-1")])
}

fn deployer(stacks: &FakeStacks) -> StackDeployer<FakeStacks> {
    StackDeployer::new(
        stacks.clone(),
        "us-east-1",
        Arc::new(DefaultTemplateResolver::new("https://templates.example.com")),
    )
    .with_poll_policy(PollPolicy::new(
        Duration::from_millis(1),
        Duration::from_millis(500),
    ))
}

fn options(wait: bool) -> DeployOptions {
    DeployOptions::builder(STACK)
        .parameter("Env=dev")
        .wait(wait)
        .build()
        .expect("options should build")
}

#[rstest]
#[tokio::test]
async fn creates_absent_stack_and_flattens_outputs(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let result = deployer(&stacks)
        .deploy(&cancel, &options(true))
        .await
        .expect("deploy should succeed");

    assert_eq!(result.operation, OperationType::Create);
    assert_eq!(result.status, DeployStatus::CreateComplete);
    assert!(!result.no_changes);
    assert_eq!(
        result.outputs.get("ApiUrl").map(String::as_str),
        Some("https://api.example.com")
    );

    let request = stacks.last_request().expect("request recorded");
    assert_eq!(request.capabilities, vec![String::from("CAPABILITY_NAMED_IAM")]);
    assert_eq!(
        request.tags.get("managed-by").map(String::as_str),
        Some("backplane")
    );
    assert_eq!(
        request.template,
        TemplateSource::Url(String::from(
            "https://templates.example.com/latest/aws.yaml"
        ))
    );
    assert!(request.request_token.starts_with("backplane-"));
}

#[rstest]
#[tokio::test]
async fn no_wait_returns_in_progress(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let result = deployer(&stacks)
        .deploy(&cancel, &options(false))
        .await
        .expect("deploy should succeed");

    assert_eq!(result.operation, OperationType::Create);
    assert_eq!(result.status, DeployStatus::InProgress);
    assert!(result.outputs.is_empty());
}

#[rstest]
#[tokio::test]
async fn unchanged_redeploy_reports_no_changes(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let subject = deployer(&stacks);
    let first = subject
        .deploy(&cancel, &options(true))
        .await
        .expect("first deploy should succeed");

    let second = subject
        .deploy(&cancel, &options(true))
        .await
        .expect("second deploy should succeed");

    assert_eq!(second.operation, OperationType::Update);
    assert_eq!(second.status, DeployStatus::NoChanges);
    assert!(second.no_changes);
    assert_eq!(stacks.count_calls("create_stack"), 1);
    assert_eq!(second.outputs, first.outputs);
    assert_eq!(
        second.outputs.get("ApiUrl").map(String::as_str),
        Some("https://api.example.com")
    );
}

#[rstest]
#[tokio::test]
async fn changed_parameters_update_the_stack(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let subject = deployer(&stacks);
    subject
        .deploy(&cancel, &options(true))
        .await
        .expect("first deploy should succeed");

    let changed = DeployOptions::builder(STACK)
        .parameter("Env=prod")
        .build()
        .expect("options should build");
    let result = subject
        .deploy(&cancel, &changed)
        .await
        .expect("update should succeed");

    assert_eq!(result.operation, OperationType::Update);
    assert_eq!(result.status, DeployStatus::UpdateComplete);
    assert!(!result.no_changes);
}

#[rstest]
#[tokio::test]
async fn rollback_surfaces_failed_events(stacks: FakeStacks) {
    stacks.script_next(vec![
        StackStatus::CreateInProgress,
        StackStatus::RollbackInProgress,
        StackStatus::RollbackComplete,
    ]);
    stacks.set_events(vec![
        StackEvent {
            logical_id: String::from("Queue"),
            resource_type: String::from("AWS::SQS::Queue"),
            status: String::from("CREATE_FAILED"),
            reason: Some(String::from("quota exceeded")),
        },
        StackEvent {
            logical_id: String::from("Topic"),
            resource_type: String::from("AWS::SNS::Topic"),
            status: String::from("CREATE_COMPLETE"),
            reason: None,
        },
    ]);
    let cancel = CancellationToken::new();

    let err = deployer(&stacks)
        .deploy(&cancel, &options(true))
        .await
        .expect_err("deploy should fail");

    let DeployError::OperationFailed { message, .. } = err else {
        panic!("expected OperationFailed, got {err:?}");
    };
    assert!(message.contains("ROLLBACK_COMPLETE"), "{message}");
    assert!(
        message.contains("Queue (AWS::SQS::Queue): quota exceeded"),
        "{message}"
    );
    assert!(!message.contains("Topic"), "{message}");
}

#[rstest]
#[tokio::test]
async fn destroy_absent_stack_is_not_found(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let result = deployer(&stacks)
        .destroy(&cancel, &DestroyOptions::new(STACK).expect("options"))
        .await
        .expect("destroy should succeed");

    assert_eq!(result, DestroyResult::not_found(STACK));
    assert_eq!(stacks.count_calls("delete_stack"), 0);
}

#[rstest]
#[tokio::test]
async fn destroy_waits_until_stack_is_gone(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let subject = deployer(&stacks);
    subject
        .deploy(&cancel, &options(true))
        .await
        .expect("deploy should succeed");

    let result = subject
        .destroy(&cancel, &DestroyOptions::new(STACK).expect("options"))
        .await
        .expect("destroy should succeed");

    assert_eq!(result.status, DeployStatus::DeleteComplete);
    assert!(!result.not_found);
    assert!(
        !subject
            .check_exists(&cancel, STACK)
            .await
            .expect("lookup should succeed")
    );
}

#[rstest]
#[tokio::test]
async fn outputs_of_absent_stack_are_not_found(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let err = deployer(&stacks)
        .outputs(&cancel, STACK)
        .await
        .expect_err("outputs should fail");
    assert!(matches!(err, DeployError::NotFound { .. }), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn region_mismatch_is_rejected(stacks: FakeStacks) {
    let cancel = CancellationToken::new();
    let request = DeployOptions::builder(STACK)
        .region(Some(String::from("eu-west-1")))
        .build()
        .expect("options should build");
    let err = deployer(&stacks)
        .deploy(&cancel, &request)
        .await
        .expect_err("deploy should fail");
    assert!(matches!(err, DeployError::Validation(_)), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn cancellation_during_wait_is_not_a_timeout(stacks: FakeStacks) {
    stacks.script_next(vec![StackStatus::CreateInProgress]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let subject = StackDeployer::new(
        stacks.clone(),
        "us-east-1",
        Arc::new(DefaultTemplateResolver::new("https://templates.example.com")),
    )
    .with_poll_policy(PollPolicy::new(
        Duration::from_secs(60),
        Duration::from_secs(600),
    ));
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = subject
        .deploy(&cancel, &options(true))
        .await
        .expect_err("deploy should be cancelled");
    handle.await.expect("cancel task should finish");

    assert!(err.is_cancelled(), "{err:?}");
}
