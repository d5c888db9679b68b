//! Managed compute services and the control plane's invocation policy.

use std::collections::BTreeMap;

use crate::error::DeployError;
use crate::poller::guarded;
use crate::project::clients::{Service, ServiceSpec};

use super::Context;
use super::encryption::Keys;
use super::identity::Accounts;
use super::messaging::Topics;
use super::network::NetworkIds;

const INVOKER_ROLE: &str = "roles/run.invoker";
const PUBLIC_MEMBER: &str = "allUsers";

/// Identifiers produced by the compute domain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Services {
    /// Control-plane service URL.
    pub orchestrator_url: String,
    /// Event-relay service URL.
    pub event_processor_url: String,
}

/// Inputs the compute domain reads from earlier domains.
#[derive(Clone, Copy, Debug)]
pub struct Dependencies<'d> {
    /// Service accounts.
    pub accounts: &'d Accounts,
    /// Network identifiers.
    pub network: &'d NetworkIds,
    /// Key names.
    pub keys: &'d Keys,
    /// Topic names.
    pub topics: &'d Topics,
    /// Registry repository name.
    pub repository: &'d str,
}

fn orchestrator_spec(ctx: &Context<'_>, deps: Dependencies<'_>) -> ServiceSpec {
    let config = ctx.config();
    let mut env = BTreeMap::from([
        (String::from("PROJECT_ID"), config.project_id.clone()),
        (String::from("REGION"), config.region.clone()),
        (String::from("TASK_EVENTS_TOPIC"), deps.topics.task_events.clone()),
        (String::from("LOG_EVENTS_TOPIC"), deps.topics.log_events.clone()),
        (String::from("KMS_KEY"), deps.keys.crypto_key.clone()),
        (String::from("RUNNER_SERVICE_ACCOUNT"), deps.accounts.runner.clone()),
        (String::from("ARTIFACT_REPOSITORY"), deps.repository.to_owned()),
    ]);
    if let Some(control) = deps.topics.control.as_ref() {
        env.insert(String::from("CONTROL_TOPIC"), control.clone());
    }
    ServiceSpec {
        name: config.orchestrator_service.clone(),
        image: config.orchestrator_image.clone(),
        env,
        min_instances: config.min_instances,
        max_instances: config.max_instances,
        timeout_secs: config.request_timeout_secs,
        service_account: deps.accounts.control.clone(),
        connector: Some(deps.network.connector.clone()),
    }
}

fn event_processor_spec(ctx: &Context<'_>, deps: Dependencies<'_>) -> ServiceSpec {
    let config = ctx.config();
    ServiceSpec {
        name: config.event_processor_service.clone(),
        image: config.event_processor_image.clone(),
        env: BTreeMap::from([
            (String::from("PROJECT_ID"), config.project_id.clone()),
            (String::from("REGION"), config.region.clone()),
            (String::from("TASK_EVENTS_TOPIC"), deps.topics.task_events.clone()),
            (String::from("LOG_EVENTS_TOPIC"), deps.topics.log_events.clone()),
        ]),
        min_instances: config.min_instances,
        max_instances: config.max_instances,
        timeout_secs: config.request_timeout_secs,
        service_account: deps.accounts.events.clone(),
        connector: Some(deps.network.connector.clone()),
    }
}

async fn ensure_service(ctx: &mut Context<'_>, spec: &ServiceSpec) -> Result<Service, DeployError> {
    let compute = ctx.clients().compute.as_ref();
    let (project, region) = (ctx.project(), ctx.region());
    let get_action = format!("get service {}", spec.name);

    match ctx
        .lookup(&get_action, compute.get_service(project, region, &spec.name))
        .await?
    {
        Some(existing) if existing.matches(spec) => return Ok(existing),
        Some(_) => {
            let action = format!("update service {}", spec.name);
            let operation = guarded(
                ctx.cancel,
                &action,
                compute.update_service(project, region, spec),
            )
            .await?;
            ctx.wait(&action, operation).await?;
            ctx.record_change(format!("service {} revision", spec.name));
        }
        None => {
            let action = format!("create service {}", spec.name);
            if let Some(operation) = ctx
                .submit(&action, compute.create_service(project, region, spec))
                .await?
            {
                ctx.wait(&action, operation).await?;
                ctx.record_change(format!("service {}", spec.name));
            }
        }
    }
    guarded(
        ctx.cancel,
        &get_action,
        compute.get_service(project, region, &spec.name),
    )
    .await
}

async fn apply_invocation_policy(
    ctx: &mut Context<'_>,
    service: &Service,
) -> Result<(), DeployError> {
    let compute = ctx.clients().compute.as_ref();
    let allow = ctx.config().allow_unauthenticated;
    let mut policy = guarded(
        ctx.cancel,
        &format!("get IAM policy of {}", service.name),
        compute.get_service_policy(&service.name),
    )
    .await?;
    let changed = if allow {
        policy.add_member(INVOKER_ROLE, PUBLIC_MEMBER)
    } else {
        policy.remove_member(INVOKER_ROLE, PUBLIC_MEMBER)
    };
    if changed {
        guarded(
            ctx.cancel,
            &format!("set IAM policy of {}", service.name),
            compute.set_service_policy(&service.name, &policy),
        )
        .await?;
        ctx.record_change(format!(
            "unauthenticated access {} on {}",
            if allow { "allowed" } else { "revoked" },
            service.name
        ));
    }
    Ok(())
}

/// Ensures both services run the configured revision and applies the
/// control plane's invocation policy.
///
/// # Errors
///
/// Returns the first lookup, create, update, operation or policy failure.
pub async fn ensure(
    ctx: &mut Context<'_>,
    deps: Dependencies<'_>,
) -> Result<Services, DeployError> {
    let orchestrator_wanted = orchestrator_spec(ctx, deps);
    let orchestrator = ensure_service(ctx, &orchestrator_wanted).await?;
    apply_invocation_policy(ctx, &orchestrator).await?;
    let event_processor_wanted = event_processor_spec(ctx, deps);
    let event_processor = ensure_service(ctx, &event_processor_wanted).await?;
    Ok(Services {
        orchestrator_url: orchestrator.uri,
        event_processor_url: event_processor.uri,
    })
}

/// Deletes both services.
///
/// # Errors
///
/// Returns the first delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let compute = ctx.clients().compute.as_ref();
    for name in [
        ctx.config().event_processor_service.as_str(),
        ctx.config().orchestrator_service.as_str(),
    ] {
        ctx.remove(
            &format!("delete service {name}"),
            compute.delete_service(ctx.project(), ctx.region(), name),
        )
        .await?;
    }
    Ok(())
}
