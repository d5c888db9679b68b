//! Log export sink routed to the log-events topic.

use crate::error::DeployError;
use crate::poller::guarded;
use crate::project::clients::{LogSink, SinkSpec};

use super::Context;
use super::messaging::Topics;

const PUBLISHER_ROLE: &str = "roles/pubsub.publisher";

/// Filter selecting the two services' revision logs.
#[must_use]
pub fn sink_filter(orchestrator_service: &str, event_processor_service: &str) -> String {
    format!(
        "resource.type=\"cloud_run_revision\" AND (resource.labels.service_name=\"{orchestrator_service}\" OR resource.labels.service_name=\"{event_processor_service}\")"
    )
}

async fn grant_writer(
    ctx: &mut Context<'_>,
    sink: &LogSink,
    topic: &str,
) -> Result<(), DeployError> {
    if sink.writer_identity.is_empty() {
        return Ok(());
    }
    let messaging = ctx.clients().messaging.as_ref();
    let mut policy = guarded(
        ctx.cancel,
        &format!("get IAM policy of {topic}"),
        messaging.get_topic_policy(topic),
    )
    .await?;
    if policy.add_member(PUBLISHER_ROLE, &sink.writer_identity) {
        guarded(
            ctx.cancel,
            &format!("set IAM policy of {topic}"),
            messaging.set_topic_policy(topic, &policy),
        )
        .await?;
        ctx.record_change(format!("log sink writer grant on {topic}"));
    }
    Ok(())
}

/// Ensures the sink exists and its writer may publish to the log topic.
/// Returns the sink name.
///
/// # Errors
///
/// Returns the first lookup, create or policy failure.
pub async fn ensure(ctx: &mut Context<'_>, topics: &Topics) -> Result<String, DeployError> {
    let logging = ctx.clients().logging.as_ref();
    let config = ctx.config();
    let project = ctx.project();
    let name = config.log_sink_name.as_str();

    let get_action = format!("get log sink {name}");
    let sink = if let Some(existing) = ctx
        .lookup(&get_action, logging.get_sink(project, name))
        .await?
    {
        existing
    } else {
        let spec = SinkSpec {
            name: name.to_owned(),
            destination: format!("pubsub.googleapis.com/{}", topics.log_events),
            filter: sink_filter(&config.orchestrator_service, &config.event_processor_service),
        };
        let action = format!("create log sink {name}");
        if let Some(created) = ctx.submit(&action, logging.create_sink(project, &spec)).await? {
            ctx.record_change(format!("log sink {name}"));
            created
        } else {
            guarded(ctx.cancel, &get_action, logging.get_sink(project, name)).await?
        }
    };

    grant_writer(ctx, &sink, &topics.log_events).await?;
    Ok(sink.name)
}

/// Deletes the sink.
///
/// # Errors
///
/// Returns the delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let name = ctx.config().log_sink_name.as_str();
    ctx.remove_now(
        &format!("delete log sink {name}"),
        ctx.clients().logging.delete_sink(ctx.project(), name),
    )
    .await
}
