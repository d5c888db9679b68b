//! Firestore database and composite indexes.

use crate::error::DeployError;
use crate::poller::guarded;
use crate::project::clients::IndexSpec;

use super::Context;

/// Collections and the fields of their composite index.
pub const INDEXED_COLLECTIONS: [(&str, &[&str]); 8] = [
    ("tasks", &["status", "createdAt"]),
    ("task_events", &["taskId", "timestamp"]),
    ("executions", &["taskId", "status", "startedAt"]),
    ("workers", &["state", "lastHeartbeat"]),
    ("log_chunks", &["executionId", "sequence"]),
    ("schedules", &["enabled", "nextRunAt"]),
    ("artifacts", &["taskId", "createdAt"]),
    ("leases", &["holder", "expiresAt"]),
];

/// Index definitions the datastore domain maintains.
#[must_use]
pub fn index_specs() -> Vec<IndexSpec> {
    INDEXED_COLLECTIONS
        .iter()
        .map(|(collection, fields)| IndexSpec {
            collection: (*collection).to_owned(),
            fields: fields.iter().map(|field| (*field).to_owned()).collect(),
        })
        .collect()
}

/// Ensures the database exists and submits any missing index. Index builds
/// run in the background and are not waited on.
///
/// Returns the database location id.
///
/// # Errors
///
/// Returns the first lookup, create or operation failure.
pub async fn ensure(ctx: &mut Context<'_>) -> Result<String, DeployError> {
    let datastore = ctx.clients().datastore.as_ref();
    let config = ctx.config();
    let project = ctx.project();

    let database = if let Some(existing) = ctx
        .lookup("get database", datastore.get_database(project))
        .await?
    {
        existing
    } else {
        let action = format!("create database in {}", config.firestore_location);
        if let Some(operation) = ctx
            .submit(
                &action,
                datastore.create_database(project, &config.firestore_location),
            )
            .await?
        {
            ctx.wait(&action, operation).await?;
            ctx.record_change(String::from("firestore database"));
        }
        guarded(ctx.cancel, "get database", datastore.get_database(project)).await?
    };

    let existing = guarded(ctx.cancel, "list indexes", datastore.list_indexes(project)).await?;
    for index in index_specs() {
        if existing.contains(&index) {
            continue;
        }
        let action = format!("create index on {}", index.collection);
        if ctx
            .submit(&action, datastore.create_index(project, &index))
            .await?
            .is_some()
        {
            ctx.record_change(format!("index {}({})", index.collection, index.fields.join(",")));
        }
    }

    Ok(database.location)
}

/// Deletes the database.
///
/// # Errors
///
/// Returns the delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    ctx.remove(
        "delete database",
        ctx.clients().datastore.delete_database(ctx.project()),
    )
    .await
}
