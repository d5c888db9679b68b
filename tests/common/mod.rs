//! Shared builders for the integration tests.

use std::sync::Arc;
use std::time::Duration;

use backplane::test_support::{FakeCloud, FakeStacks};
use backplane::{DefaultTemplateResolver, PollPolicy, ProjectDeployer, StackDeployer};

pub const STACK_REGION: &str = "us-east-1";
pub const PROJECT_REGION: &str = "us-central1";

pub fn fast() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(1), Duration::from_millis(500))
}

pub fn resolver() -> Arc<DefaultTemplateResolver> {
    Arc::new(DefaultTemplateResolver::new("https://templates.example.com"))
}

pub fn stack_deployer(stacks: &FakeStacks) -> StackDeployer<FakeStacks> {
    StackDeployer::new(stacks.clone(), STACK_REGION, resolver()).with_poll_policy(fast())
}

pub fn project_deployer(cloud: &FakeCloud) -> ProjectDeployer<FakeCloud> {
    ProjectDeployer::from_client(Arc::new(cloud.clone()), PROJECT_REGION, resolver())
        .with_poll_policy(fast(), fast())
}
