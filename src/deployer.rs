//! Provider-polymorphic deployer contract.
//!
//! [`Deployer`] is the only interface the execution layer depends on. The
//! concrete provider is chosen from a case-insensitive token through
//! [`Provider`] and wrapped in [`AnyDeployer`], which dispatches
//! exhaustively so a new provider is a compile-time checked extension.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BackplaneConfig;
use crate::error::DeployError;
use crate::project::ProjectDeployer;
use crate::project::rest::GcpRestClient;
use crate::stack::StackDeployer;
use crate::stack::aws::AwsStackClient;
use crate::template::{DefaultTemplateResolver, TemplateResolver};

/// Future returned by deployer operations.
pub type DeployFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DeployError>> + Send + 'a>>;

/// Template version used when the caller does not name one.
pub const DEFAULT_TEMPLATE_VERSION: &str = "latest";

/// Supported infrastructure providers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// AWS `CloudFormation` templated stacks.
    Aws,
    /// Google Cloud project plus resource graph.
    Gcp,
}

impl Provider {
    /// Every supported provider, in display order.
    pub const ALL: [Self; 2] = [Self::Aws, Self::Gcp];

    /// Token accepted by [`FromStr`].
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
        }
    }

    /// Region used when neither configuration nor options name one.
    #[must_use]
    pub const fn default_region(self) -> &'static str {
        match self {
            Self::Aws => "us-east-1",
            Self::Gcp => "us-central1",
        }
    }

    fn supported() -> String {
        Self::ALL
            .iter()
            .map(|provider| provider.token())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Provider {
    type Err = DeployError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let normalised = token.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|provider| provider.token() == normalised)
            .ok_or_else(|| DeployError::UnsupportedProvider {
                token: token.to_owned(),
                supported: Self::supported(),
            })
    }
}

/// Kind of change a deploy performed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// The target did not exist and was created.
    Create,
    /// The target existed and was updated (or left unchanged).
    Update,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
        })
    }
}

/// Closed vocabulary of deploy and destroy outcomes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    /// Creation finished.
    CreateComplete,
    /// Update finished.
    UpdateComplete,
    /// Deletion finished.
    DeleteComplete,
    /// Work was submitted but not waited on.
    InProgress,
    /// The target already matched the request.
    NoChanges,
    /// The target did not exist.
    NotFound,
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::InProgress => "IN_PROGRESS",
            Self::NoChanges => "NO_CHANGES",
            Self::NotFound => "NOT_FOUND",
        })
    }
}

/// Parameters for a deploy call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOptions {
    /// Stack name or project id.
    pub name: String,
    /// Optional template locator handed to the template resolver.
    pub template: Option<String>,
    /// Template version.
    pub version: String,
    /// Raw `KEY=VALUE` parameter strings.
    pub parameters: Vec<String>,
    /// Whether to block until the provider reports a terminal state.
    pub wait: bool,
    /// Region override; the deployer's region applies when absent.
    pub region: Option<String>,
    /// Parent organisation for new projects (project path only).
    pub organization_id: Option<String>,
}

impl DeployOptions {
    /// Starts a builder for [`DeployOptions`] targeting `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DeployOptionsBuilder {
        DeployOptionsBuilder::new(name)
    }
}

/// Builder for [`DeployOptions`] that trims and validates on build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOptionsBuilder {
    name: String,
    template: Option<String>,
    version: String,
    parameters: Vec<String>,
    wait: bool,
    region: Option<String>,
    organization_id: Option<String>,
}

impl DeployOptionsBuilder {
    /// Creates a builder that waits for completion and uses the default
    /// template version.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: None,
            version: DEFAULT_TEMPLATE_VERSION.to_owned(),
            parameters: Vec::new(),
            wait: true,
            region: None,
            organization_id: None,
        }
    }

    /// Sets the template locator.
    #[must_use]
    pub fn template(mut self, value: Option<String>) -> Self {
        self.template = value;
        self
    }

    /// Sets the template version.
    #[must_use]
    pub fn version(mut self, value: impl Into<String>) -> Self {
        self.version = value.into();
        self
    }

    /// Appends a raw `KEY=VALUE` parameter.
    #[must_use]
    pub fn parameter(mut self, value: impl Into<String>) -> Self {
        self.parameters.push(value.into());
        self
    }

    /// Replaces the raw parameter list.
    #[must_use]
    pub fn parameters(mut self, values: Vec<String>) -> Self {
        self.parameters = values;
        self
    }

    /// Sets whether to wait for completion.
    #[must_use]
    pub const fn wait(mut self, value: bool) -> Self {
        self.wait = value;
        self
    }

    /// Sets the region override.
    #[must_use]
    pub fn region(mut self, value: Option<String>) -> Self {
        self.region = value;
        self
    }

    /// Sets the parent organisation.
    #[must_use]
    pub fn organization_id(mut self, value: Option<String>) -> Self {
        self.organization_id = value;
        self
    }

    /// Builds the options, trimming strings and dropping blank optionals.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Validation`] when the name or version is empty.
    pub fn build(self) -> Result<DeployOptions, DeployError> {
        let options = DeployOptions {
            name: self.name.trim().to_owned(),
            template: non_blank(self.template),
            version: self.version.trim().to_owned(),
            parameters: self.parameters,
            wait: self.wait,
            region: non_blank(self.region),
            organization_id: non_blank(self.organization_id),
        };
        if options.name.is_empty() {
            return Err(DeployError::Validation(String::from(
                "deploy target name must not be empty",
            )));
        }
        if options.version.is_empty() {
            return Err(DeployError::Validation(String::from(
                "template version must not be empty",
            )));
        }
        Ok(options)
    }
}

/// Parameters for a destroy call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DestroyOptions {
    /// Stack name or project id.
    pub name: String,
    /// Whether to block until deletion finishes.
    pub wait: bool,
    /// Region override; the deployer's region applies when absent.
    pub region: Option<String>,
}

impl DestroyOptions {
    /// Creates destroy options that wait for completion.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Validation`] when `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, DeployError> {
        let raw: String = name.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DeployError::Validation(String::from(
                "destroy target name must not be empty",
            )));
        }
        Ok(Self {
            name: trimmed.to_owned(),
            wait: true,
            region: None,
        })
    }

    /// Sets whether to wait for completion.
    #[must_use]
    pub const fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Sets the region override.
    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = non_blank(region);
        self
    }
}

/// Result of a deploy call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DeployResult {
    /// Stack name or project id.
    pub name: String,
    /// Whether the call created or updated the target.
    pub operation: OperationType,
    /// Terminal (or soft) status.
    pub status: DeployStatus,
    /// Flattened outputs.
    pub outputs: BTreeMap<String, String>,
    /// Set when the target already matched the request.
    pub no_changes: bool,
}

/// Result of a destroy call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DestroyResult {
    /// Stack name or project id.
    pub name: String,
    /// Terminal (or soft) status.
    pub status: DeployStatus,
    /// Set when the target did not exist.
    pub not_found: bool,
}

impl DestroyResult {
    /// Result reported when the target is absent.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: DeployStatus::NotFound,
            not_found: true,
        }
    }
}

/// Contract implemented by every provider.
pub trait Deployer: Send + Sync {
    /// Creates or updates the target described by `options`.
    fn deploy<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        options: &'a DeployOptions,
    ) -> DeployFuture<'a, DeployResult>;

    /// Removes the target; an absent target is a successful `NOT_FOUND`.
    fn destroy<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        options: &'a DestroyOptions,
    ) -> DeployFuture<'a, DestroyResult>;

    /// Reports whether the target exists.
    fn check_exists<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> DeployFuture<'a, bool>;

    /// Returns the target's flattened outputs.
    fn outputs<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> DeployFuture<'a, BTreeMap<String, String>>;

    /// Region the deployer operates in by default.
    fn region(&self) -> &str;
}

/// Deployer selected from a provider token.
pub enum AnyDeployer {
    /// Templated-stack provider.
    Stack(StackDeployer<AwsStackClient>),
    /// Project plus resource graph provider.
    Project(ProjectDeployer<GcpRestClient>),
}

impl AnyDeployer {
    /// Parses `token` and connects the matching provider.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::UnsupportedProvider`] for unknown tokens and
    /// [`DeployError::Configuration`] when the configuration is incomplete.
    pub async fn from_token(token: &str, config: &BackplaneConfig) -> Result<Self, DeployError> {
        let provider = token.parse::<Provider>()?;
        Self::connect(provider, config).await
    }

    /// Connects the deployer for `provider` using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Configuration`] when the configuration is
    /// incomplete or a client cannot be constructed.
    pub async fn connect(provider: Provider, config: &BackplaneConfig) -> Result<Self, DeployError> {
        config.validate_for(provider)?;
        let region = config.region_for(provider);
        let resolver: Arc<dyn TemplateResolver> =
            Arc::new(DefaultTemplateResolver::new(config.template_base_url.clone()));
        info!(%provider, %region, "connecting deployer");
        match provider {
            Provider::Aws => {
                let client = AwsStackClient::connect(&region).await;
                Ok(Self::Stack(StackDeployer::new(client, region, resolver)))
            }
            Provider::Gcp => {
                let token = config.gcp_access_token.clone().unwrap_or_default();
                let client = Arc::new(GcpRestClient::new(token)?);
                Ok(Self::Project(
                    ProjectDeployer::from_client(client, region, resolver)
                        .with_allow_unauthenticated(config.allow_unauthenticated)
                        .with_organization_id(config.organization_id.clone()),
                ))
            }
        }
    }

    /// Provider behind this deployer.
    #[must_use]
    pub const fn provider(&self) -> Provider {
        match self {
            Self::Stack(_) => Provider::Aws,
            Self::Project(_) => Provider::Gcp,
        }
    }
}

impl Deployer for AnyDeployer {
    fn deploy<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        options: &'a DeployOptions,
    ) -> DeployFuture<'a, DeployResult> {
        match self {
            Self::Stack(inner) => inner.deploy(cancel, options),
            Self::Project(inner) => inner.deploy(cancel, options),
        }
    }

    fn destroy<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        options: &'a DestroyOptions,
    ) -> DeployFuture<'a, DestroyResult> {
        match self {
            Self::Stack(inner) => inner.destroy(cancel, options),
            Self::Project(inner) => inner.destroy(cancel, options),
        }
    }

    fn check_exists<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> DeployFuture<'a, bool> {
        match self {
            Self::Stack(inner) => inner.check_exists(cancel, name),
            Self::Project(inner) => inner.check_exists(cancel, name),
        }
    }

    fn outputs<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> DeployFuture<'a, BTreeMap<String, String>> {
        match self {
            Self::Stack(inner) => inner.outputs(cancel, name),
            Self::Project(inner) => inner.outputs(cancel, name),
        }
    }

    fn region(&self) -> &str {
        match self {
            Self::Stack(inner) => inner.region(),
            Self::Project(inner) => inner.region(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("aws", Provider::Aws)]
    #[case("AWS", Provider::Aws)]
    #[case(" Gcp ", Provider::Gcp)]
    fn provider_tokens_are_case_insensitive(#[case] token: &str, #[case] expected: Provider) {
        assert_eq!(token.parse::<Provider>().expect("token should parse"), expected);
    }

    #[rstest]
    #[case("azure")]
    #[case("")]
    fn unknown_tokens_name_the_supported_set(#[case] token: &str) {
        let err = token.parse::<Provider>().expect_err("token should be rejected");
        assert_eq!(
            err,
            DeployError::UnsupportedProvider {
                token: token.to_owned(),
                supported: String::from("aws, gcp"),
            }
        );
    }

    #[rstest]
    fn builder_trims_and_defaults() {
        let options = DeployOptions::builder("  backplane-dev ")
            .template(Some(String::from("   ")))
            .region(Some(String::from(" eu-west-1 ")))
            .build()
            .expect("options should build");
        assert_eq!(options.name, "backplane-dev");
        assert_eq!(options.template, None);
        assert_eq!(options.region.as_deref(), Some("eu-west-1"));
        assert_eq!(options.version, DEFAULT_TEMPLATE_VERSION);
        assert!(options.wait);
    }

    #[rstest]
    fn builder_rejects_blank_name() {
        let err = DeployOptions::builder(" ")
            .build()
            .expect_err("blank name should fail");
        assert!(matches!(err, DeployError::Validation(_)));
    }

    #[rstest]
    fn destroy_options_reject_blank_name() {
        assert!(DestroyOptions::new("").is_err());
    }

    #[rstest]
    #[case(DeployStatus::NoChanges, "NO_CHANGES")]
    #[case(DeployStatus::InProgress, "IN_PROGRESS")]
    #[case(DeployStatus::CreateComplete, "CREATE_COMPLETE")]
    fn statuses_render_in_screaming_case(#[case] status: DeployStatus, #[case] expected: &str) {
        assert_eq!(status.to_string(), expected);
        assert_eq!(
            serde_json::to_value(status).expect("status serialises"),
            serde_json::Value::String(expected.to_owned())
        );
    }
}
