//! Push subscription wiring task events to the event relay.

use crate::error::DeployError;
use crate::poller::guarded;
use crate::project::clients::SubscriptionSpec;

use super::Context;
use super::compute::Services;
use super::identity::Accounts;
use super::messaging::Topics;

/// Path on the event relay that receives pushed task events.
pub const PUSH_PATH: &str = "/events/pubsub";

/// Ensures the push subscription exists and returns its full name.
///
/// # Errors
///
/// Returns the first lookup or create failure.
pub async fn ensure(
    ctx: &mut Context<'_>,
    topics: &Topics,
    services: &Services,
    accounts: &Accounts,
) -> Result<String, DeployError> {
    let messaging = ctx.clients().messaging.as_ref();
    let project = ctx.project();
    let name = ctx.config().task_events_subscription.as_str();

    let get_action = format!("get subscription {name}");
    if let Some(existing) = ctx
        .lookup(&get_action, messaging.get_subscription(project, name))
        .await?
    {
        return Ok(existing.name);
    }

    let spec = SubscriptionSpec {
        name: name.to_owned(),
        topic: topics.task_events.clone(),
        push_endpoint: format!(
            "{}{PUSH_PATH}",
            services.event_processor_url.trim_end_matches('/')
        ),
        push_service_account: accounts.events.clone(),
    };
    let action = format!("create subscription {name}");
    if let Some(created) = ctx
        .submit(&action, messaging.create_subscription(project, &spec))
        .await?
    {
        ctx.record_change(format!("subscription {name}"));
        return Ok(created.name);
    }
    Ok(
        guarded(ctx.cancel, &get_action, messaging.get_subscription(project, name))
            .await?
            .name,
    )
}

/// Deletes the push subscription.
///
/// # Errors
///
/// Returns the delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let name = ctx.config().task_events_subscription.as_str();
    ctx.remove_now(
        &format!("delete subscription {name}"),
        ctx.clients().messaging.delete_subscription(ctx.project(), name),
    )
    .await
}
