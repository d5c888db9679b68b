//! Unit tests for the poll loop and cancellation guards.

use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rstest::{fixture, rstest};

#[fixture]
fn quick() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(2), Duration::from_millis(200))
}

#[rstest]
#[tokio::test]
async fn succeeds_after_pending_checks(quick: PollPolicy) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let cancel = CancellationToken::new();
    let value = poll_until(&cancel, quick, "create widget", move || {
        let seen = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if seen < 2 {
                Ok(PollOutcome::Pending)
            } else {
                Ok(PollOutcome::Succeeded("ready"))
            }
        }
    })
    .await
    .expect("poll should succeed");

    assert_eq!(value, "ready");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[rstest]
#[tokio::test]
async fn times_out_when_never_terminal() {
    let cancel = CancellationToken::new();
    let policy = PollPolicy::new(Duration::from_millis(2), Duration::from_millis(15));
    let err = poll_until(&cancel, policy, "create widget", || async {
        Ok::<_, DeployError>(PollOutcome::<()>::Pending)
    })
    .await
    .expect_err("poll should time out");

    assert!(
        matches!(err, DeployError::Timeout { ref operation, .. } if operation == "create widget"),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn hung_check_is_bounded_by_timeout() {
    let cancel = CancellationToken::new();
    let policy = PollPolicy::new(Duration::from_millis(2), Duration::from_millis(50));
    let poll = poll_until(&cancel, policy, "describe widget", || {
        std::future::pending::<Result<PollOutcome<()>, DeployError>>()
    });

    let err = tokio::time::timeout(Duration::from_secs(2), poll)
        .await
        .expect("deadline should end the wait on its own")
        .expect_err("poll should time out");

    assert!(
        matches!(err, DeployError::Timeout { ref operation, .. } if operation == "describe widget"),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn failure_joins_every_message(quick: PollPolicy) {
    let cancel = CancellationToken::new();
    let err = poll_until(&cancel, quick, "delete widget", || async {
        Ok::<_, DeployError>(PollOutcome::<()>::Failed(vec![
            String::from("quota exceeded"),
            String::from(" "),
            String::from("bucket busy"),
        ]))
    })
    .await
    .expect_err("poll should fail");

    assert_eq!(
        err,
        DeployError::OperationFailed {
            operation: String::from("delete widget"),
            message: String::from("quota exceeded; bucket busy"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn failure_without_messages_still_explains(quick: PollPolicy) {
    let cancel = CancellationToken::new();
    let err = poll_until(&cancel, quick, "op", || async {
        Ok::<_, DeployError>(PollOutcome::<()>::Failed(Vec::new()))
    })
    .await
    .expect_err("poll should fail");

    assert!(err.to_string().contains("without details"), "{err}");
}

#[rstest]
#[tokio::test]
async fn check_errors_propagate(quick: PollPolicy) {
    let cancel = CancellationToken::new();
    let err = poll_until(&cancel, quick, "op", || async {
        Err::<PollOutcome<()>, _>(DeployError::Validation(String::from("bad")))
    })
    .await
    .expect_err("poll should propagate");

    assert_eq!(err, DeployError::Validation(String::from("bad")));
}

#[rstest]
#[tokio::test]
async fn cancellation_interrupts_sleep() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let policy = PollPolicy::new(Duration::from_secs(30), Duration::from_secs(600));
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = poll_until(&cancel, policy, "create project", || async {
        Ok::<_, DeployError>(PollOutcome::<()>::Pending)
    })
    .await
    .expect_err("poll should be cancelled");
    handle.await.expect("cancel task should finish");

    assert!(err.is_cancelled(), "unexpected error: {err:?}");
}

#[rstest]
#[tokio::test]
async fn pre_cancelled_token_skips_check(quick: PollPolicy) {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let err = poll_until(&cancel, quick, "op", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, DeployError>(PollOutcome::Succeeded(())) }
    })
    .await
    .expect_err("poll should be cancelled");

    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "future is built but never polled");
}

#[rstest]
#[tokio::test]
async fn guarded_wraps_client_failures() {
    let cancel = CancellationToken::new();
    let err = guarded(&cancel, "create topic t", async {
        Err::<(), _>(ClientError::PermissionDenied(String::from("nope")))
    })
    .await
    .expect_err("call should fail");

    assert_eq!(
        err,
        DeployError::Provider {
            action: String::from("create topic t"),
            message: String::from("permission denied: nope"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn race_cancel_preserves_classification() {
    let cancel = CancellationToken::new();
    let result = race_cancel(&cancel, "get topic t", async {
        Err::<(), _>(ClientError::NotFound(String::from("t")))
    })
    .await
    .expect("call should not be cancelled");

    assert_eq!(result, Err(ClientError::NotFound(String::from("t"))));
}
