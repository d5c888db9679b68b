//! Binary entry point for the backplane CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backplane::{
    AnyDeployer, BackplaneConfig, DeployError, DeployOptions, Deployer, DestroyOptions, Provider,
};

mod cli;

use cli::{Cli, Command, DeployCommand, DestroyCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error("failed to render output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("backplane=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let mut config =
        BackplaneConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if cli.region.is_some() {
        config.region = cli.region;
    }
    let provider = config.provider.parse::<Provider>()?;

    if matches!(cli.command, Command::Region) {
        return emit_line(&config.region_for(provider));
    }

    let deployer = AnyDeployer::connect(provider, &config).await?;
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Command::Deploy(args) => {
            let options = deploy_options(args, &config)?;
            let result = deployer.deploy(&cancel, &options).await?;
            emit_json(&result)
        }
        Command::Destroy(args) => {
            let options = destroy_options(args, &config)?;
            let result = deployer.destroy(&cancel, &options).await?;
            emit_json(&result)
        }
        Command::Exists(target) => {
            let exists = deployer.check_exists(&cancel, &target.name).await?;
            emit_line(if exists { "true" } else { "false" })
        }
        Command::Outputs(target) => {
            let outputs = deployer.outputs(&cancel, &target.name).await?;
            emit_json(&outputs)
        }
        Command::Region => emit_line(deployer.region()),
    }
}

fn deploy_options(args: DeployCommand, config: &BackplaneConfig) -> Result<DeployOptions, CliError> {
    let organization = args.organization.or_else(|| config.organization_id.clone());
    Ok(DeployOptions::builder(args.name)
        .template(args.template)
        .version(args.version)
        .parameters(args.params)
        .wait(!args.no_wait)
        .region(config.region.clone())
        .organization_id(organization)
        .build()?)
}

fn destroy_options(
    args: DestroyCommand,
    config: &BackplaneConfig,
) -> Result<DestroyOptions, CliError> {
    Ok(DestroyOptions::new(args.name)?
        .with_wait(!args.no_wait)
        .with_region(config.region.clone()))
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received; cancelling");
                cancel.cancel();
            }
            Err(err) => warn!(error = %err, "failed to listen for interrupts"),
        }
    });
}

fn emit_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))?;
    emit_line(&rendered)
}

fn emit_line(text: &str) -> Result<(), CliError> {
    writeln!(io::stdout(), "{text}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
