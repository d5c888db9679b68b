//! Pub/Sub topics.

use crate::error::DeployError;
use crate::poller::guarded;

use super::Context;

/// Full names of the managed topics.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Topics {
    /// Task-events topic.
    pub task_events: String,
    /// Log-events topic.
    pub log_events: String,
    /// Control topic, when configured.
    pub control: Option<String>,
}

async fn ensure_topic(ctx: &mut Context<'_>, name: &str) -> Result<String, DeployError> {
    let messaging = ctx.clients().messaging.as_ref();
    let project = ctx.project();
    let get_action = format!("get topic {name}");
    if let Some(existing) = ctx
        .lookup(&get_action, messaging.get_topic(project, name))
        .await?
    {
        return Ok(existing.name);
    }
    let action = format!("create topic {name}");
    if let Some(created) = ctx.submit(&action, messaging.create_topic(project, name)).await? {
        ctx.record_change(format!("topic {name}"));
        return Ok(created.name);
    }
    Ok(guarded(ctx.cancel, &get_action, messaging.get_topic(project, name))
        .await?
        .name)
}

/// Ensures every configured topic exists.
///
/// # Errors
///
/// Returns the first lookup or create failure.
pub async fn ensure(ctx: &mut Context<'_>) -> Result<Topics, DeployError> {
    let config = ctx.config();
    let task_events = ensure_topic(ctx, &config.task_events_topic).await?;
    let log_events = ensure_topic(ctx, &config.log_events_topic).await?;
    let control = match config.control_topic.as_deref() {
        Some(name) => Some(ensure_topic(ctx, name).await?),
        None => None,
    };
    Ok(Topics {
        task_events,
        log_events,
        control,
    })
}

/// Deletes every configured topic.
///
/// # Errors
///
/// Returns the first delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    for name in ctx.config().topics().into_iter().rev() {
        ctx.remove_now(
            &format!("delete topic {name}"),
            ctx.clients().messaging.delete_topic(ctx.project(), name),
        )
        .await?;
    }
    Ok(())
}
