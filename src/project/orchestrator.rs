//! Resource convergence orchestrator.
//!
//! [`converge`] runs the ten domains strictly in [`CONVERGE_ORDER`] and stops
//! at the first failure; re-running resumes cleanly because every domain is
//! idempotent. [`teardown`] walks [`TEARDOWN_ORDER`] and attempts every
//! domain, collecting failures instead of stopping.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{DeployError, DomainFailure};
use crate::poller::PollPolicy;

use super::clients::{ProjectInfo, ResourceClients};
use super::domain::{CONVERGE_ORDER, Domain, TEARDOWN_ORDER};
use super::ensure::{
    Context, compute, datastore, encryption, events, identity, logging, messaging, network,
    registry, scheduling,
};
use super::resources::{BackendResources, ResourceConfig};

/// Outcome of a converge pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConvergeReport {
    /// Identifiers read back from every domain.
    pub resources: BackendResources,
    /// Everything the pass created or changed, in order.
    pub changes: Vec<String>,
}

fn in_domain(domain: Domain) -> impl FnOnce(DeployError) -> DeployError {
    move |err| {
        if err.is_cancelled() {
            err
        } else {
            DeployError::Converge {
                domain,
                source: Box::new(err),
            }
        }
    }
}

/// Converges every resource domain of `config` inside `project`.
///
/// # Errors
///
/// Returns [`DeployError::Converge`] naming the first failing domain, or
/// [`DeployError::Cancelled`] when `cancel` fires.
pub async fn converge(
    cancel: &CancellationToken,
    clients: &ResourceClients,
    config: &ResourceConfig,
    project: &ProjectInfo,
    policy: PollPolicy,
) -> Result<ConvergeReport, DeployError> {
    let mut ctx = Context::new(cancel, clients, config, policy);
    let started = |domain: Domain| info!(project = %config.project_id, %domain, "converging");

    let [
        identity_step,
        network_step,
        datastore_step,
        encryption_step,
        messaging_step,
        registry_step,
        compute_step,
        events_step,
        scheduling_step,
        logging_step,
    ] = CONVERGE_ORDER;

    started(identity_step);
    let accounts = identity::ensure(&mut ctx).await.map_err(in_domain(identity_step))?;
    started(network_step);
    let network_ids = network::ensure(&mut ctx).await.map_err(in_domain(network_step))?;
    started(datastore_step);
    let firestore_location = datastore::ensure(&mut ctx)
        .await
        .map_err(in_domain(datastore_step))?;
    started(encryption_step);
    let keys = encryption::ensure(&mut ctx)
        .await
        .map_err(in_domain(encryption_step))?;
    started(messaging_step);
    let topics = messaging::ensure(&mut ctx)
        .await
        .map_err(in_domain(messaging_step))?;
    started(registry_step);
    let repository = registry::ensure(&mut ctx)
        .await
        .map_err(in_domain(registry_step))?;
    started(compute_step);
    let services = compute::ensure(
        &mut ctx,
        compute::Dependencies {
            accounts: &accounts,
            network: &network_ids,
            keys: &keys,
            topics: &topics,
            repository: &repository,
        },
    )
    .await
    .map_err(in_domain(compute_step))?;
    started(events_step);
    let subscription = events::ensure(&mut ctx, &topics, &services, &accounts)
        .await
        .map_err(in_domain(events_step))?;
    started(scheduling_step);
    let scheduler_job = scheduling::ensure(&mut ctx, &services, &accounts)
        .await
        .map_err(in_domain(scheduling_step))?;
    started(logging_step);
    logging::ensure(&mut ctx, &topics)
        .await
        .map_err(in_domain(logging_step))?;

    let resources = BackendResources {
        project_id: project.project_id.clone(),
        project_number: project.number.clone(),
        region: config.region.clone(),
        vpc_name: network_ids.vpc,
        subnet_name: network_ids.subnet,
        connector_name: network_ids.connector,
        firestore_location,
        public_endpoint: services.orchestrator_url.clone(),
        orchestrator_url: services.orchestrator_url,
        event_processor_url: services.event_processor_url,
        task_events_topic: topics.task_events,
        log_events_topic: topics.log_events,
        control_topic: topics.control,
        task_events_subscription: subscription,
        key_ring: keys.key_ring,
        crypto_key: keys.crypto_key,
        scheduler_job,
        control_service_account: accounts.control,
        events_service_account: accounts.events,
        runner_service_account: accounts.runner,
        repository,
    };
    Ok(ConvergeReport {
        resources,
        changes: ctx.into_changes(),
    })
}

async fn teardown_domain(ctx: &Context<'_>, domain: Domain) -> Result<(), DeployError> {
    match domain {
        Domain::Logging => logging::teardown(ctx).await,
        Domain::Scheduling => scheduling::teardown(ctx).await,
        Domain::EventWiring => events::teardown(ctx).await,
        Domain::Compute => compute::teardown(ctx).await,
        Domain::Registry => registry::teardown(ctx).await,
        Domain::Messaging => messaging::teardown(ctx).await,
        Domain::Encryption => encryption::teardown(ctx).await,
        Domain::Datastore => datastore::teardown(ctx).await,
        Domain::Network => network::teardown(ctx).await,
        Domain::Identity => identity::teardown(ctx).await,
        Domain::DeploymentRecord | Domain::Project => Ok(()),
    }
}

/// Tears every domain down in reverse convergence order, attempting each
/// one regardless of earlier failures.
///
/// Returns the ordered list of failures; an empty list means every domain
/// was removed.
///
/// # Errors
///
/// Returns [`DeployError::Cancelled`] when `cancel` fires; cancellation
/// stops the walk.
pub async fn teardown(
    cancel: &CancellationToken,
    clients: &ResourceClients,
    config: &ResourceConfig,
    policy: PollPolicy,
) -> Result<Vec<DomainFailure>, DeployError> {
    let ctx = Context::new(cancel, clients, config, policy);
    let mut failures = Vec::new();
    for domain in TEARDOWN_ORDER {
        info!(project = %config.project_id, %domain, "tearing down");
        match teardown_domain(&ctx, domain).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return Err(err),
            Err(error) => {
                warn!(project = %config.project_id, %domain, %error, "teardown step failed");
                failures.push(DomainFailure { domain, error });
            }
        }
    }
    Ok(failures)
}
