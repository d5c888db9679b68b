//! [`StackClient`] over the AWS `CloudFormation` SDK.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::config::http::HttpResponse;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{Capability, Parameter, Tag};

use crate::error::{ClientError, ClientFuture};
use crate::template::TemplateSource;

use super::client::{
    StackClient, StackDescription, StackEvent, StackOutput, StackRequest,
};
use super::status::StackStatus;

/// Bound on a single SDK call, retries included.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// `CloudFormation` client bound to one region.
#[derive(Clone, Debug)]
pub struct AwsStackClient {
    client: Client,
}

impl AwsStackClient {
    /// Loads credentials from the default provider chain and binds `region`.
    pub async fn connect(region: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(OPERATION_TIMEOUT)
                    .build(),
            )
            .load()
            .await;
        Self {
            client: Client::new(&shared),
        }
    }
}

fn classify<E>(err: &SdkError<E, HttpResponse>) -> ClientError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(err).to_string(), ToOwned::to_owned);
    match err {
        SdkError::ServiceError(service) => ClientError::Api {
            status: service.raw().status().as_u16(),
            message,
        },
        _ => ClientError::Transport(message),
    }
}

fn parameters(request: &StackRequest) -> Vec<Parameter> {
    request
        .parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

fn tags(request: &StackRequest) -> Result<Vec<Tag>, ClientError> {
    request
        .tags
        .iter()
        .map(|(key, value)| {
            Ok(Tag::builder().key(key).value(value).build())
        })
        .collect()
}

fn capabilities(request: &StackRequest) -> Vec<Capability> {
    request
        .capabilities
        .iter()
        .map(|capability| Capability::from(capability.as_str()))
        .collect()
}

impl StackClient for AwsStackClient {
    fn describe_stack<'a>(&'a self, name: &'a str) -> ClientFuture<'a, StackDescription> {
        Box::pin(async move {
            let output = self
                .client
                .describe_stacks()
                .stack_name(name)
                .send()
                .await
                .map_err(|err| classify(&err))?;
            let stack = output
                .stacks()
                .first()
                .ok_or_else(|| ClientError::NotFound(format!("Stack with id {name} does not exist")))?;
            Ok(StackDescription {
                name: stack.stack_name().unwrap_or(name).to_owned(),
                status: StackStatus::parse(
                    stack
                        .stack_status()
                        .map_or("UNKNOWN", |status| status.as_str()),
                ),
                status_reason: stack.stack_status_reason().map(ToOwned::to_owned),
                outputs: stack
                    .outputs()
                    .iter()
                    .filter_map(|output| {
                        Some(StackOutput {
                            key: output.output_key()?.to_owned(),
                            value: output.output_value().unwrap_or_default().to_owned(),
                        })
                    })
                    .collect(),
            })
        })
    }

    fn create_stack<'a>(&'a self, request: &'a StackRequest) -> ClientFuture<'a, String> {
        Box::pin(async move {
            let mut call = self
                .client
                .create_stack()
                .stack_name(&request.name)
                .set_parameters(Some(parameters(request)))
                .set_capabilities(Some(capabilities(request)))
                .set_tags(Some(tags(request)?))
                .client_request_token(&request.request_token);
            call = match &request.template {
                TemplateSource::Url(url) => call.template_url(url),
                TemplateSource::Body(body) => call.template_body(body),
            };
            let output = call.send().await.map_err(|err| classify(&err))?;
            Ok(output.stack_id().unwrap_or(&request.name).to_owned())
        })
    }

    fn update_stack<'a>(&'a self, request: &'a StackRequest) -> ClientFuture<'a, String> {
        Box::pin(async move {
            let mut call = self
                .client
                .update_stack()
                .stack_name(&request.name)
                .set_parameters(Some(parameters(request)))
                .set_capabilities(Some(capabilities(request)))
                .set_tags(Some(tags(request)?))
                .client_request_token(&request.request_token);
            call = match &request.template {
                TemplateSource::Url(url) => call.template_url(url),
                TemplateSource::Body(body) => call.template_body(body),
            };
            let output = call.send().await.map_err(|err| classify(&err))?;
            Ok(output.stack_id().unwrap_or(&request.name).to_owned())
        })
    }

    fn delete_stack<'a>(&'a self, name: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_stack()
                .stack_name(name)
                .send()
                .await
                .map_err(|err| classify(&err))?;
            Ok(())
        })
    }

    fn stack_events<'a>(&'a self, name: &'a str) -> ClientFuture<'a, Vec<StackEvent>> {
        Box::pin(async move {
            let output = self
                .client
                .describe_stack_events()
                .stack_name(name)
                .send()
                .await
                .map_err(|err| classify(&err))?;
            Ok(output
                .stack_events()
                .iter()
                .map(|event| StackEvent {
                    logical_id: event.logical_resource_id().unwrap_or_default().to_owned(),
                    resource_type: event.resource_type().unwrap_or_default().to_owned(),
                    status: event
                        .resource_status()
                        .map_or("", |status| status.as_str())
                        .to_owned(),
                    reason: event.resource_status_reason().map(ToOwned::to_owned),
                })
                .collect())
        })
    }
}
