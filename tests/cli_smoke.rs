//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("backplane");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = cargo_bin_cmd!("backplane");
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("deploy")
            .and(predicate::str::contains("destroy"))
            .and(predicate::str::contains("exists"))
            .and(predicate::str::contains("outputs"))
            .and(predicate::str::contains("region")),
    );
}

#[test]
fn region_reports_provider_default() {
    let mut cmd = cargo_bin_cmd!("backplane");
    cmd.env_remove("BACKPLANE_REGION")
        .args(["--provider", "gcp", "region"])
        .assert()
        .success()
        .stdout("us-central1\n");
}

#[test]
fn region_flag_overrides_default() {
    let mut cmd = cargo_bin_cmd!("backplane");
    cmd.args(["--provider", "aws", "--region", "eu-west-1", "region"])
        .assert()
        .success()
        .stdout("eu-west-1\n");
}

#[test]
fn unsupported_provider_fails_with_message() {
    let mut cmd = cargo_bin_cmd!("backplane");
    cmd.args(["--provider", "azure", "region"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported provider 'azure'"));
}

#[test]
fn project_commands_need_an_access_token() {
    let mut cmd = cargo_bin_cmd!("backplane");
    cmd.env_remove("BACKPLANE_GCP_ACCESS_TOKEN")
        .args(["--provider", "gcp", "exists", "demo-proj"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BACKPLANE_GCP_ACCESS_TOKEN"));
}
