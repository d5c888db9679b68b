//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::deployer::Provider;

/// Base URL that default template locations are derived from.
pub const DEFAULT_TEMPLATE_BASE_URL: &str = "https://storage.googleapis.com/backplane-templates";

/// Deployer settings derived from environment variables, configuration files,
/// and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BACKPLANE",
    discovery(
        app_name = "backplane",
        env_var = "BACKPLANE_CONFIG_PATH",
        config_file_name = "backplane.toml",
        dotfile_name = ".backplane.toml",
        project_file_name = "backplane.toml"
    )
)]
pub struct BackplaneConfig {
    /// Provider token selecting the deployer (`aws` or `gcp`).
    #[ortho_config(default = "aws".to_owned())]
    pub provider: String,
    /// Region override. When absent the provider default applies
    /// (`us-east-1` for AWS, `us-central1` for GCP).
    pub region: Option<String>,
    /// Base URL used when no template locator is supplied; templates live at
    /// `<base>/<version>/<provider>.yaml`.
    #[ortho_config(default = DEFAULT_TEMPLATE_BASE_URL.to_owned())]
    pub template_base_url: String,
    /// OAuth access token for the Google Cloud REST APIs. Required for the
    /// `gcp` provider.
    pub gcp_access_token: Option<String>,
    /// Parent organisation for newly created projects.
    pub organization_id: Option<String>,
    /// Whether the control-plane service accepts unauthenticated invocations.
    #[ortho_config(default = false)]
    pub allow_unauthenticated: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl BackplaneConfig {
    fn require_field(value: Option<&str>, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.is_none_or(|text| text.trim().is_empty()) {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to backplane.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("backplane")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the configured region, or the provider default when unset.
    #[must_use]
    pub fn region_for(&self, provider: Provider) -> String {
        self.region
            .as_deref()
            .map(str::trim)
            .filter(|region| !region.is_empty())
            .map_or_else(|| provider.default_region().to_owned(), ToOwned::to_owned)
    }

    /// Performs semantic validation of the fields the given provider needs.
    /// Error messages include guidance on how to provide missing values via
    /// environment variables or configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate_for(&self, provider: Provider) -> Result<(), ConfigError> {
        Self::require_field(
            Some(self.template_base_url.as_str()),
            &FieldMetadata::new(
                "template base URL",
                "BACKPLANE_TEMPLATE_BASE_URL",
                "template_base_url",
            ),
        )?;
        if provider == Provider::Gcp {
            Self::require_field(
                self.gcp_access_token.as_deref(),
                &FieldMetadata::new(
                    "Google Cloud access token",
                    "BACKPLANE_GCP_ACCESS_TOKEN",
                    "gcp_access_token",
                ),
            )?;
        }
        Ok(())
    }
}

impl Default for BackplaneConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Aws.to_string(),
            region: None,
            template_base_url: DEFAULT_TEMPLATE_BASE_URL.to_owned(),
            gcp_access_token: None,
            organization_id: None,
            allow_unauthenticated: false,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
