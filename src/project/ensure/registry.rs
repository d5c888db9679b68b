//! Artifact Registry repository.

use crate::error::DeployError;
use crate::poller::guarded;

use super::Context;

/// Ensures the image repository exists and returns its full name.
///
/// # Errors
///
/// Returns the first lookup, create or operation failure.
pub async fn ensure(ctx: &mut Context<'_>) -> Result<String, DeployError> {
    let registry = ctx.clients().registry.as_ref();
    let name = ctx.config().repository_name.as_str();
    let (project, region) = (ctx.project(), ctx.region());

    let get_action = format!("get repository {name}");
    if let Some(existing) = ctx
        .lookup(&get_action, registry.get_repository(project, region, name))
        .await?
    {
        return Ok(existing.name);
    }

    let action = format!("create repository {name}");
    if let Some(operation) = ctx
        .submit(&action, registry.create_repository(project, region, name))
        .await?
    {
        ctx.wait(&action, operation).await?;
        ctx.record_change(format!("repository {name}"));
    }
    Ok(
        guarded(ctx.cancel, &get_action, registry.get_repository(project, region, name))
            .await?
            .name,
    )
}

/// Deletes the repository and every image in it.
///
/// # Errors
///
/// Returns the delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let name = ctx.config().repository_name.as_str();
    ctx.remove(
        &format!("delete repository {name}"),
        ctx.clients()
            .registry
            .delete_repository(ctx.project(), ctx.region(), name),
    )
    .await
}
