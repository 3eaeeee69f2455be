//! CloudWatch Logs log groups

use crate::context::AwsContext;
use crate::error::{classify, follow_up};
use crate::sdk::{Present, TagsField, tag_hash_map};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client;
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, ProviderError, ResourceKind, ResourceProvider,
    RetryConfig, TagMap,
};
use tracing::info;

pub struct LogGroupProvider {
    client: Client,
    retry: RetryConfig,
}

/// DescribeLogGroups reports ARNs with a trailing `:*`; tagging APIs want it without.
fn tagging_arn(arn: &str) -> &str {
    arn.strip_suffix(":*").unwrap_or(arn)
}

impl LogGroupProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.logs_client(),
            retry: RetryConfig::default(),
        }
    }

    async fn find(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .describe_log_groups()
                .log_group_name_prefix(name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify(&e))?;

            let found = output
                .log_groups()
                .iter()
                .find(|group| group.log_group_name().present() == Some(name));
            if let Some(group) = found {
                let arn = group
                    .arn()
                    .present()
                    .map(tagging_arn)
                    .ok_or_else(|| ProviderError::api("MissingArn", format!("log group {name} has no ARN")))?;
                return Ok(Some(ExistingResource {
                    id: arn.to_string(),
                    attributes: Attributes::from([
                        (AttributeName::Arn, arn.to_string()),
                        (AttributeName::Name, name.to_string()),
                    ]),
                }));
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl ResourceProvider for LogGroupProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LogGroup
    }

    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        self.find(name).await
    }

    async fn create(&self, request: &CreateRequest<'_>) -> Result<Attributes, ProviderError> {
        info!(log_group = %request.name, "Creating log group");

        self.client
            .create_log_group()
            .log_group_name(request.name)
            .set_tags(Some(tag_hash_map(request.tags)))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        // CreateLogGroup returns nothing; read the ARN back
        follow_up(&self.retry, "DescribeLogGroups", || async {
            self.find(request.name)
                .await?
                .map(|existing| existing.attributes)
                .ok_or_else(|| ProviderError::Propagation(format!("log group {} not visible yet", request.name)))
        })
        .await
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_arn(id)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(output.tags().to_tag_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagging_arn() {
        assert_eq!(
            tagging_arn("arn:aws:logs:eu-west-1:123456789012:log-group:/nestor/app/dev/access:*"),
            "arn:aws:logs:eu-west-1:123456789012:log-group:/nestor/app/dev/access"
        );
        assert_eq!(tagging_arn("arn:plain"), "arn:plain");
    }
}
