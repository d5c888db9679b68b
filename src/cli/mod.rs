//! Command-line interface definitions for the `backplane` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `backplane` binary.
#[derive(Debug, Parser)]
#[command(
    name = "backplane",
    about = "Provision and tear down the backplane backend on a cloud provider",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Provider to deploy to (`aws` or `gcp`). Overrides `BACKPLANE_PROVIDER`.
    #[arg(long, global = true, value_name = "PROVIDER")]
    pub(crate) provider: Option<String>,
    /// Region override. Overrides `BACKPLANE_REGION`.
    #[arg(long, global = true, value_name = "REGION")]
    pub(crate) region: Option<String>,
    /// Action to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `backplane`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create or update a stack or project.
    #[command(name = "deploy")]
    Deploy(DeployCommand),
    /// Tear down a stack or project.
    #[command(name = "destroy")]
    Destroy(DestroyCommand),
    /// Report whether a stack or project exists.
    #[command(name = "exists")]
    Exists(TargetArgs),
    /// Print the outputs of a deployed stack or project.
    #[command(name = "outputs")]
    Outputs(TargetArgs),
    /// Print the region the selected provider operates in.
    #[command(name = "region")]
    Region,
}

/// Names the stack or project a command acts on.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Stack name or project id.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
}

/// Arguments for `backplane deploy`.
#[derive(Debug, Args)]
pub(crate) struct DeployCommand {
    /// Stack name or project id.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
    /// Template locator: a URL, a local file, or an inline document.
    #[arg(long, value_name = "LOCATOR")]
    pub(crate) template: Option<String>,
    /// Template version used when no locator is given.
    #[arg(long, value_name = "VERSION", default_value = "latest")]
    pub(crate) version: String,
    /// Template parameter as `KEY=VALUE`; may be repeated.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub(crate) params: Vec<String>,
    /// Return once the work is submitted instead of waiting for completion.
    #[arg(long)]
    pub(crate) no_wait: bool,
    /// Parent organisation for a newly created project.
    #[arg(long, value_name = "ORGANIZATION_ID")]
    pub(crate) organization: Option<String>,
}

/// Arguments for `backplane destroy`.
#[derive(Debug, Args)]
pub(crate) struct DestroyCommand {
    /// Stack name or project id.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
    /// Return once deletion is submitted instead of waiting for completion.
    #[arg(long)]
    pub(crate) no_wait: bool,
}
