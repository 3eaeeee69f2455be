//! EventBridge event buses

use crate::context::AwsContext;
use crate::error::classify;
use crate::sdk::Present;
use async_trait::async_trait;
use aws_sdk_eventbridge::Client;
use aws_sdk_eventbridge::types::Tag;
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, ProviderError, ResourceKind, ResourceProvider,
    TagMap,
};
use tracing::info;

pub struct EventBusProvider {
    client: Client,
}

impl EventBusProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.eventbridge_client(),
        }
    }
}

fn attributes(arn: &str, name: &str) -> Attributes {
    Attributes::from([
        (AttributeName::Arn, arn.to_string()),
        (AttributeName::Name, name.to_string()),
    ])
}

#[async_trait]
impl ResourceProvider for EventBusProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::EventBus
    }

    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        match self.client.describe_event_bus().name(name).send().await {
            Ok(output) => {
                let arn = output
                    .arn()
                    .present()
                    .ok_or_else(|| ProviderError::api("MissingArn", format!("event bus {name} has no ARN")))?;
                Ok(Some(ExistingResource {
                    id: arn.to_string(),
                    attributes: attributes(arn, name),
                }))
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(classify(&e)),
        }
    }

    async fn create(&self, request: &CreateRequest<'_>) -> Result<Attributes, ProviderError> {
        info!(bus = %request.name, "Creating EventBridge bus");

        let tags = request
            .tags
            .iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| ProviderError::InvalidInput(format!("failed to build tag: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .create_event_bus()
            .name(request.name)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let arn = output
            .event_bus_arn()
            .present()
            .ok_or_else(|| ProviderError::api("MissingArn", "CreateEventBus returned no ARN"))?;
        Ok(attributes(arn, request.name))
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_arn(id)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        Ok(output
            .tags()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }
}
