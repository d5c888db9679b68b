//! Unit tests for configuration validation.

use backplane::{BackplaneConfig, ConfigError, DeployError, Provider};
use rstest::*;

#[fixture]
fn gcp_config() -> BackplaneConfig {
    BackplaneConfig {
        provider: String::from("gcp"),
        gcp_access_token: Some(String::from("ya29.example")),
        ..BackplaneConfig::default()
    }
}

#[rstest]
fn defaults_select_the_stack_provider() {
    let cfg = BackplaneConfig::default();

    assert_eq!(cfg.provider, "aws");
    assert!(!cfg.allow_unauthenticated);
    assert!(cfg.validate_for(Provider::Aws).is_ok());
}

#[rstest]
fn missing_token_error_is_actionable(gcp_config: BackplaneConfig) {
    let cfg = BackplaneConfig {
        gcp_access_token: Some(String::from("   ")),
        ..gcp_config
    };

    let error = cfg
        .validate_for(Provider::Gcp)
        .expect_err("token is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error");
    };
    assert!(
        message.contains("BACKPLANE_GCP_ACCESS_TOKEN"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("backplane.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains("gcp_access_token"),
        "error should mention TOML key: {message}"
    );
}

#[rstest]
fn blank_template_base_url_is_rejected_for_every_provider(gcp_config: BackplaneConfig) {
    let cfg = BackplaneConfig {
        template_base_url: String::new(),
        ..gcp_config
    };

    for provider in Provider::ALL {
        let message = cfg
            .validate_for(provider)
            .expect_err("base URL is required")
            .to_string();
        assert!(
            message.contains("BACKPLANE_TEMPLATE_BASE_URL"),
            "error should mention env var: {message}"
        );
    }
}

#[rstest]
fn token_is_only_required_for_the_project_provider() {
    assert!(BackplaneConfig::default().validate_for(Provider::Aws).is_ok());
    assert!(BackplaneConfig::default().validate_for(Provider::Gcp).is_err());
}

#[rstest]
#[case(Some("eu-west-2"), "eu-west-2")]
#[case(Some("  "), "us-east-1")]
#[case(None, "us-east-1")]
fn region_override_wins_over_default(#[case] region: Option<&str>, #[case] expected: &str) {
    let cfg = BackplaneConfig {
        region: region.map(ToOwned::to_owned),
        ..BackplaneConfig::default()
    };

    assert_eq!(cfg.region_for(Provider::Aws), expected);
}

#[rstest]
fn configuration_errors_surface_as_deploy_errors() {
    let error = DeployError::from(ConfigError::MissingField(String::from("missing thing")));

    assert!(
        matches!(error, DeployError::Configuration(ref message) if message.contains("missing thing"))
    );
}
