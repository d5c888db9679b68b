//! Provider selection through the public facade.

use backplane::{AnyDeployer, BackplaneConfig, DeployError, Provider};
use rstest::rstest;

#[rstest]
#[case("azure")]
#[case("")]
#[tokio::test]
async fn unknown_provider_tokens_are_rejected(#[case] token: &str) {
    let Err(err) = AnyDeployer::from_token(token, &BackplaneConfig::default()).await else {
        panic!("token '{token}' should be rejected");
    };

    let DeployError::UnsupportedProvider { supported, .. } = err else {
        panic!("expected UnsupportedProvider, got {err:?}");
    };
    assert!(supported.contains("aws"));
    assert!(supported.contains("gcp"));
}

#[rstest]
#[tokio::test]
async fn project_provider_requires_an_access_token() {
    let Err(err) = AnyDeployer::connect(Provider::Gcp, &BackplaneConfig::default()).await else {
        panic!("connect should fail without a token");
    };

    assert!(
        matches!(err, DeployError::Configuration(ref message) if message.contains("BACKPLANE_GCP_ACCESS_TOKEN")),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn project_provider_connects_with_a_token() {
    let config = BackplaneConfig {
        provider: String::from("gcp"),
        region: Some(String::from("europe-west1")),
        gcp_access_token: Some(String::from("ya29.example")),
        ..BackplaneConfig::default()
    };

    let deployer = AnyDeployer::from_token(&config.provider, &config)
        .await
        .expect("gcp deployer should connect");

    assert_eq!(deployer.provider(), Provider::Gcp);
    assert_eq!(backplane::Deployer::region(&deployer), "europe-west1");
}

#[rstest]
#[case(Provider::Aws, "us-east-1")]
#[case(Provider::Gcp, "us-central1")]
fn providers_fall_back_to_their_default_region(#[case] provider: Provider, #[case] region: &str) {
    assert_eq!(BackplaneConfig::default().region_for(provider), region);
}
