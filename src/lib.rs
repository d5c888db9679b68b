//! Core library for the backplane deployer.
//!
//! The crate provisions and tears down one backend on one of two cloud
//! providers behind a single [`Deployer`] contract. The templated-stack
//! provider ([`StackDeployer`]) submits a declarative template and polls the
//! stack to a terminal state. The project provider ([`ProjectDeployer`])
//! creates a project, converges its resource domains in a fixed order and
//! records the result as a deployment whose manifest serves outputs.

pub mod config;
pub mod deployer;
pub mod error;
pub mod params;
pub mod poller;
pub mod project;
pub mod stack;
pub mod template;
pub mod test_support;

pub use config::{BackplaneConfig, ConfigError};
pub use deployer::{
    AnyDeployer, DEFAULT_TEMPLATE_VERSION, DeployFuture, DeployOptions, DeployOptionsBuilder,
    DeployResult, DeployStatus, Deployer, DestroyOptions, DestroyResult, OperationType, Provider,
};
pub use error::{ClientError, ClientFuture, DeployError, DomainFailure};
pub use params::parse_parameters;
pub use poller::{PollOutcome, PollPolicy};
pub use project::{BackendResources, ConvergeReport, Domain, ProjectDeployer};
pub use stack::{StackDeployer, StackStatus};
pub use template::{DefaultTemplateResolver, TemplateResolver, TemplateSource};
