//! S3 buckets

use crate::context::AwsContext;
use crate::error::{classify, follow_up};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Event, FilterRule, FilterRuleName,
    LambdaFunctionConfiguration, NotificationConfiguration, NotificationConfigurationFilter, S3KeyFilter,
    Tag, Tagging,
};
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, NotificationTarget, ProviderError, ResourceKind,
    ResourceProvider, RetryConfig, TagMap,
};
use tracing::{debug, info};

/// Object created notifications for every key
const OBJECT_CREATED: &str = "s3:ObjectCreated:*";

pub struct BucketProvider {
    client: Client,
    region: String,
    retry: RetryConfig,
}

fn attributes(name: &str) -> Attributes {
    Attributes::from([
        (AttributeName::Arn, format!("arn:aws:s3:::{name}")),
        (AttributeName::Name, name.to_string()),
    ])
}

fn build_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::InvalidInput(format!("failed to build S3 request: {e}"))
}

impl BucketProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.s3_client(),
            region: ctx.region().to_string(),
            retry: RetryConfig::default(),
        }
    }

    async fn put_tags(&self, name: &str, tags: &TagMap) -> Result<(), ProviderError> {
        let tag_set = tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build().map_err(build_error))
            .collect::<Result<Vec<_>, _>>()?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(build_error)?;

        self.client
            .put_bucket_tagging()
            .bucket(name)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for BucketProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Bucket
    }

    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        match self.client.head_bucket().bucket(name).send().await {
            Ok(_) => Ok(Some(ExistingResource {
                id: name.to_string(),
                attributes: attributes(name),
            })),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(classify(&e)),
        }
    }

    async fn create(&self, request: &CreateRequest<'_>) -> Result<Attributes, ProviderError> {
        info!(bucket = %request.name, region = %self.region, "Creating S3 bucket");

        let mut create = self.client.create_bucket().bucket(request.name);
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            create = create.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        create.send().await.map_err(|e| classify(&e))?;

        // CreateBucket takes no tags
        follow_up(&self.retry, "PutBucketTagging", || self.put_tags(request.name, request.tags)).await?;
        debug!(bucket = %request.name, "bucket tagged");
        Ok(attributes(request.name))
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        match self.client.get_bucket_tagging().bucket(id).send().await {
            Ok(output) => Ok(output
                .tag_set()
                .iter()
                .map(|tag| (tag.key().to_string(), tag.value().to_string()))
                .collect()),
            Err(e) if e.code() == Some("NoSuchTagSet") => Ok(TagMap::new()),
            Err(e) => Err(classify(&e)),
        }
    }
}

fn filter(target: &NotificationTarget) -> Option<NotificationConfigurationFilter> {
    let mut rules = Vec::new();
    if let Some(prefix) = &target.prefix {
        rules.push(FilterRule::builder().name(FilterRuleName::Prefix).value(prefix).build());
    }
    if let Some(suffix) = &target.suffix {
        rules.push(FilterRule::builder().name(FilterRuleName::Suffix).value(suffix).build());
    }
    if rules.is_empty() {
        return None;
    }
    Some(
        NotificationConfigurationFilter::builder()
            .key(S3KeyFilter::builder().set_filter_rules(Some(rules)).build())
            .build(),
    )
}

/// Replaces the bucket's function notifications, keeping queue, topic and
/// EventBridge configurations untouched.
pub(crate) async fn put_function_notifications(
    client: &Client,
    bucket: &str,
    targets: &[NotificationTarget],
) -> Result<(), ProviderError> {
    let current = client
        .get_bucket_notification_configuration()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| classify(&e))?;

    let mut functions = Vec::with_capacity(targets.len());
    for target in targets {
        let function_arn = target
            .function
            .attribute(AttributeName::Arn)
            .ok_or_else(|| ProviderError::InvalidInput(format!("{} has no Arn", target.function.id)))?;
        let configuration = LambdaFunctionConfiguration::builder()
            .id(&target.statement_id)
            .lambda_function_arn(function_arn)
            .events(Event::from(OBJECT_CREATED))
            .set_filter(filter(target))
            .build()
            .map_err(build_error)?;
        functions.push(configuration);
    }

    let configuration = NotificationConfiguration::builder()
        .set_topic_configurations(Some(current.topic_configurations().to_vec()))
        .set_queue_configurations(Some(current.queue_configurations().to_vec()))
        .set_event_bridge_configuration(current.event_bridge_configuration().cloned())
        .set_lambda_function_configurations(Some(functions))
        .build();

    info!(bucket = %bucket, targets = targets.len(), "Updating bucket notifications");
    client
        .put_bucket_notification_configuration()
        .bucket(bucket)
        .notification_configuration(configuration)
        .send()
        .await
        .map_err(|e| classify(&e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestor_cloud::{LogicalResourceId, RegisteredResource};

    fn target(prefix: Option<&str>, suffix: Option<&str>) -> NotificationTarget {
        NotificationTarget {
            statement_id: "sid-store-worker".to_string(),
            function: RegisteredResource {
                id: LogicalResourceId::new(ResourceKind::Function, "worker"),
                kind: ResourceKind::Function,
                attributes: Attributes::new(),
            },
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
        }
    }

    #[test]
    fn test_bucket_attributes() {
        let attributes = attributes("app-dev-store");
        assert_eq!(attributes[&AttributeName::Arn], "arn:aws:s3:::app-dev-store");
        assert_eq!(attributes[&AttributeName::Name], "app-dev-store");
    }

    #[test]
    fn test_filter_rules() {
        assert!(filter(&target(None, None)).is_none());

        let filter = filter(&target(Some("uploads/"), Some(".png"))).unwrap();
        let rules = filter.key().unwrap().filter_rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name(), Some(&FilterRuleName::Prefix));
        assert_eq!(rules[0].value(), Some("uploads/"));
        assert_eq!(rules[1].name(), Some(&FilterRuleName::Suffix));
    }
}
