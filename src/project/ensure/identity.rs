//! Service accounts and their project role bindings.

use crate::error::DeployError;
use crate::poller::guarded;
use crate::project::clients::ServiceAccount;
use crate::project::resources::{CONTROL_ACCOUNT_ID, EVENTS_ACCOUNT_ID, RUNNER_ACCOUNT_ID};

use super::Context;

const CONTROL_ROLES: &[&str] = &[
    "roles/datastore.user",
    "roles/pubsub.publisher",
    "roles/cloudkms.cryptoKeyEncrypterDecrypter",
    "roles/run.invoker",
    "roles/logging.logWriter",
    "roles/iam.serviceAccountUser",
];

const EVENTS_ROLES: &[&str] = &[
    "roles/datastore.user",
    "roles/pubsub.subscriber",
    "roles/run.invoker",
    "roles/logging.logWriter",
];

const RUNNER_ROLES: &[&str] = &[
    "roles/datastore.user",
    "roles/pubsub.publisher",
    "roles/artifactregistry.reader",
    "roles/cloudkms.cryptoKeyEncrypterDecrypter",
    "roles/logging.logWriter",
];

/// Emails of the three service accounts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Accounts {
    /// Control-plane account.
    pub control: String,
    /// Event-relay account.
    pub events: String,
    /// Execution-runner account.
    pub runner: String,
}

async fn ensure_account(
    ctx: &mut Context<'_>,
    account_id: &str,
    display_name: &str,
) -> Result<ServiceAccount, DeployError> {
    let identity = ctx.clients().identity.as_ref();
    let project = ctx.project();
    let get_action = format!("get service account {account_id}");
    if let Some(existing) = ctx
        .lookup(&get_action, identity.get_service_account(project, account_id))
        .await?
    {
        return Ok(existing);
    }

    let create_action = format!("create service account {account_id}");
    if let Some(created) = ctx
        .submit(
            &create_action,
            identity.create_service_account(project, account_id, display_name),
        )
        .await?
    {
        ctx.record_change(format!("service account {account_id}"));
        return Ok(created);
    }
    guarded(
        ctx.cancel,
        &get_action,
        identity.get_service_account(project, account_id),
    )
    .await
}

/// Ensures the three service accounts exist and hold their roles.
///
/// # Errors
///
/// Returns the first lookup, create or policy failure.
pub async fn ensure(ctx: &mut Context<'_>) -> Result<Accounts, DeployError> {
    let control = ensure_account(ctx, CONTROL_ACCOUNT_ID, "backplane control plane").await?;
    let events = ensure_account(ctx, EVENTS_ACCOUNT_ID, "backplane event relay").await?;
    let runner = ensure_account(ctx, RUNNER_ACCOUNT_ID, "backplane task runner").await?;

    let identity = ctx.clients().identity.as_ref();
    let project = ctx.project();
    let mut policy = guarded(
        ctx.cancel,
        "get project IAM policy",
        identity.get_project_policy(project),
    )
    .await?;

    let mut changed = false;
    for (account, roles) in [
        (&control, CONTROL_ROLES),
        (&events, EVENTS_ROLES),
        (&runner, RUNNER_ROLES),
    ] {
        let member = format!("serviceAccount:{}", account.email);
        for role in roles {
            changed |= policy.add_member(role, &member);
        }
    }
    if changed {
        guarded(
            ctx.cancel,
            "set project IAM policy",
            identity.set_project_policy(project, &policy),
        )
        .await?;
        ctx.record_change(String::from("project IAM bindings"));
    }

    Ok(Accounts {
        control: control.email,
        events: events.email,
        runner: runner.email,
    })
}

/// Deletes the three service accounts.
///
/// # Errors
///
/// Returns the first delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let identity = ctx.clients().identity.as_ref();
    for account_id in [RUNNER_ACCOUNT_ID, EVENTS_ACCOUNT_ID, CONTROL_ACCOUNT_ID] {
        let email = ctx.config().account_email(account_id);
        ctx.remove_now(
            &format!("delete service account {account_id}"),
            identity.delete_service_account(ctx.project(), &email),
        )
        .await?;
    }
    Ok(())
}
