//! Periodic health-reconciliation job.

use crate::error::DeployError;
use crate::poller::guarded;
use crate::project::clients::JobSpec;

use super::Context;
use super::compute::Services;
use super::identity::Accounts;

/// Ensures the scheduler job exists and returns its full name.
///
/// # Errors
///
/// Returns the first lookup or create failure.
pub async fn ensure(
    ctx: &mut Context<'_>,
    services: &Services,
    accounts: &Accounts,
) -> Result<String, DeployError> {
    let scheduler = ctx.clients().scheduler.as_ref();
    let config = ctx.config();
    let (project, region) = (ctx.project(), ctx.region());
    let name = config.scheduler_job_name.as_str();

    let get_action = format!("get scheduler job {name}");
    if let Some(existing) = ctx
        .lookup(&get_action, scheduler.get_job(project, region, name))
        .await?
    {
        return Ok(existing.name);
    }

    let spec = JobSpec {
        name: name.to_owned(),
        schedule: config.health_schedule.clone(),
        target_uri: format!(
            "{}{}",
            services.event_processor_url.trim_end_matches('/'),
            config.health_path
        ),
        service_account: accounts.events.clone(),
    };
    let action = format!("create scheduler job {name}");
    if let Some(created) = ctx
        .submit(&action, scheduler.create_job(project, region, &spec))
        .await?
    {
        ctx.record_change(format!("scheduler job {name}"));
        return Ok(created.name);
    }
    Ok(
        guarded(ctx.cancel, &get_action, scheduler.get_job(project, region, name))
            .await?
            .name,
    )
}

/// Deletes the scheduler job.
///
/// # Errors
///
/// Returns the delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let name = ctx.config().scheduler_job_name.as_str();
    ctx.remove_now(
        &format!("delete scheduler job {name}"),
        ctx.clients()
            .scheduler
            .delete_job(ctx.project(), ctx.region(), name),
    )
    .await
}
