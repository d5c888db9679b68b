//! VPC, subnet, egress firewall rule and serverless connector.

use crate::error::DeployError;
use crate::poller::guarded;
use crate::project::clients::{ConnectorSpec, FirewallSpec, SubnetSpec};

use super::Context;

/// Identifiers produced by the network domain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkIds {
    /// VPC name.
    pub vpc: String,
    /// Subnet name.
    pub subnet: String,
    /// Full connector resource name.
    pub connector: String,
}

/// Ensures the network chain exists, in dependency order.
///
/// # Errors
///
/// Returns the first lookup, create or operation failure.
pub async fn ensure(ctx: &mut Context<'_>) -> Result<NetworkIds, DeployError> {
    let network = ctx.clients().network.as_ref();
    let config = ctx.config();
    let (project, region) = (ctx.project(), ctx.region());

    let get_vpc = format!("get network {}", config.vpc_name);
    let vpc = if let Some(existing) = ctx
        .lookup(&get_vpc, network.get_network(project, &config.vpc_name))
        .await?
    {
        existing
    } else {
        let action = format!("create network {}", config.vpc_name);
        if let Some(operation) = ctx
            .submit(&action, network.insert_network(project, &config.vpc_name))
            .await?
        {
            ctx.wait(&action, operation).await?;
            ctx.record_change(format!("network {}", config.vpc_name));
        }
        guarded(ctx.cancel, &get_vpc, network.get_network(project, &config.vpc_name)).await?
    };

    let get_subnet = format!("get subnet {}", config.subnet_name);
    let subnet = if let Some(existing) = ctx
        .lookup(
            &get_subnet,
            network.get_subnet(project, region, &config.subnet_name),
        )
        .await?
    {
        existing
    } else {
        let action = format!("create subnet {}", config.subnet_name);
        let spec = SubnetSpec {
            name: config.subnet_name.clone(),
            network: vpc.self_link.clone(),
            cidr: config.subnet_cidr.clone(),
        };
        if let Some(operation) = ctx
            .submit(&action, network.insert_subnet(project, region, &spec))
            .await?
        {
            ctx.wait(&action, operation).await?;
            ctx.record_change(format!("subnet {}", config.subnet_name));
        }
        guarded(
            ctx.cancel,
            &get_subnet,
            network.get_subnet(project, region, &config.subnet_name),
        )
        .await?
    };

    let get_firewall = format!("get firewall {}", config.firewall_name);
    if ctx
        .lookup(
            &get_firewall,
            network.get_firewall(project, &config.firewall_name),
        )
        .await?
        .is_none()
    {
        let action = format!("create firewall {}", config.firewall_name);
        let spec = FirewallSpec {
            name: config.firewall_name.clone(),
            network: vpc.self_link.clone(),
        };
        if let Some(operation) = ctx
            .submit(&action, network.insert_firewall(project, &spec))
            .await?
        {
            ctx.wait(&action, operation).await?;
            ctx.record_change(format!("firewall {}", config.firewall_name));
        }
    }

    let get_connector = format!("get connector {}", config.connector_name);
    let connector = if let Some(existing) = ctx
        .lookup(
            &get_connector,
            network.get_connector(project, region, &config.connector_name),
        )
        .await?
    {
        existing
    } else {
        let action = format!("create connector {}", config.connector_name);
        let spec = ConnectorSpec {
            name: config.connector_name.clone(),
            network: vpc.name.clone(),
            cidr: config.connector_cidr.clone(),
        };
        if let Some(operation) = ctx
            .submit(&action, network.create_connector(project, region, &spec))
            .await?
        {
            ctx.wait(&action, operation).await?;
            ctx.record_change(format!("connector {}", config.connector_name));
        }
        guarded(
            ctx.cancel,
            &get_connector,
            network.get_connector(project, region, &config.connector_name),
        )
        .await?
    };

    Ok(NetworkIds {
        vpc: vpc.name,
        subnet: subnet.name,
        connector: connector.name,
    })
}

/// Deletes the connector, firewall rule, subnet and network.
///
/// # Errors
///
/// Returns the first delete failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let network = ctx.clients().network.as_ref();
    let config = ctx.config();
    let (project, region) = (ctx.project(), ctx.region());

    ctx.remove(
        &format!("delete connector {}", config.connector_name),
        network.delete_connector(project, region, &config.connector_name),
    )
    .await?;
    ctx.remove(
        &format!("delete firewall {}", config.firewall_name),
        network.delete_firewall(project, &config.firewall_name),
    )
    .await?;
    ctx.remove(
        &format!("delete subnet {}", config.subnet_name),
        network.delete_subnet(project, region, &config.subnet_name),
    )
    .await?;
    ctx.remove(
        &format!("delete network {}", config.vpc_name),
        network.delete_network(project, &config.vpc_name),
    )
    .await
}
