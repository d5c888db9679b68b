//! Client seam for templated stacks and the values it exchanges.

use std::collections::BTreeMap;

use crate::error::ClientFuture;
use crate::template::TemplateSource;

use super::status::StackStatus;

/// Capability acknowledged on every create and update.
pub const IAM_CAPABILITY: &str = "CAPABILITY_NAMED_IAM";
/// Tag key marking stacks owned by this tool.
pub const MANAGED_BY_TAG_KEY: &str = "managed-by";
/// Tag value marking stacks owned by this tool.
pub const MANAGED_BY_TAG_VALUE: &str = "backplane";

/// One declared stack output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Output value.
    pub value: String,
}

/// Current description of a stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackDescription {
    /// Stack name.
    pub name: String,
    /// Current status.
    pub status: StackStatus,
    /// Reason attached to the current status, if any.
    pub status_reason: Option<String>,
    /// Declared outputs.
    pub outputs: Vec<StackOutput>,
}

/// One stack event, used for failure diagnostics.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackEvent {
    /// Logical id of the sub-resource.
    pub logical_id: String,
    /// Resource type of the sub-resource.
    pub resource_type: String,
    /// Resource status at the time of the event.
    pub status: String,
    /// Reason attached to the event.
    pub reason: Option<String>,
}

impl StackEvent {
    /// Returns `true` for events recording a failed sub-resource.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.ends_with("_FAILED")
    }
}

/// Create or update submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackRequest {
    /// Stack name.
    pub name: String,
    /// Template reference or body.
    pub template: TemplateSource,
    /// Template parameters.
    pub parameters: BTreeMap<String, String>,
    /// Capabilities acknowledged for the submission.
    pub capabilities: Vec<String>,
    /// Tags applied to the stack.
    pub tags: BTreeMap<String, String>,
    /// Idempotency token for provider-side retries.
    pub request_token: String,
}

impl StackRequest {
    /// Builds a request carrying the fixed capability and ownership tag and a
    /// fresh request token.
    #[must_use]
    pub fn new(
        name: &str,
        template: TemplateSource,
        parameters: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            template,
            parameters,
            capabilities: vec![IAM_CAPABILITY.to_owned()],
            tags: BTreeMap::from([(
                MANAGED_BY_TAG_KEY.to_owned(),
                MANAGED_BY_TAG_VALUE.to_owned(),
            )]),
            request_token: format!("backplane-{}", uuid::Uuid::new_v4()),
        }
    }
}

/// Operations the stack deployer needs from the provider.
pub trait StackClient: Send + Sync {
    /// Describes the named stack. Absent stacks surface as an error whose
    /// message contains "does not exist".
    fn describe_stack<'a>(&'a self, name: &'a str) -> ClientFuture<'a, StackDescription>;

    /// Submits a stack creation and returns the stack id.
    fn create_stack<'a>(&'a self, request: &'a StackRequest) -> ClientFuture<'a, String>;

    /// Submits a stack update and returns the stack id. An unchanged
    /// template surfaces as an error containing "No updates are to be
    /// performed".
    fn update_stack<'a>(&'a self, request: &'a StackRequest) -> ClientFuture<'a, String>;

    /// Submits a stack deletion.
    fn delete_stack<'a>(&'a self, name: &'a str) -> ClientFuture<'a, ()>;

    /// Lists the stack's events, most recent first.
    fn stack_events<'a>(&'a self, name: &'a str) -> ClientFuture<'a, Vec<StackEvent>>;
}
