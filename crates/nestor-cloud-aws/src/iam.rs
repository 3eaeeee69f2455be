//! IAM execution roles

use crate::context::AwsContext;
use crate::error::{classify, follow_up};
use crate::policy;
use async_trait::async_trait;
use aws_sdk_iam::Client;
use aws_sdk_iam::types::{Role, Tag};
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, ProviderError, ResourceKind, ResourceProvider,
    ResourceSpec, RetryConfig, RoleSpec, TagMap,
};
use tracing::{debug, info};

pub struct RoleProvider {
    client: Client,
    retry: RetryConfig,
}

fn attributes(role: &Role) -> Attributes {
    Attributes::from([
        (AttributeName::Arn, role.arn().to_string()),
        (AttributeName::Name, role.role_name().to_string()),
    ])
}

impl RoleProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
            retry: RetryConfig::default(),
        }
    }
}

#[async_trait]
impl ResourceProvider for RoleProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        match self.client.get_role().role_name(name).send().await {
            Ok(output) => Ok(output.role().map(|role| ExistingResource {
                id: role.role_name().to_string(),
                attributes: attributes(role),
            })),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(classify(&e)),
        }
    }

    async fn create(&self, request: &CreateRequest<'_>) -> Result<Attributes, ProviderError> {
        let default_spec = RoleSpec::default();
        let spec = match request.spec {
            ResourceSpec::Role(spec) => spec,
            _ => &default_spec,
        };
        info!(role = %request.name, service = %spec.trusted_service, "Creating IAM role");

        let tags = request
            .tags
            .iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| ProviderError::InvalidInput(format!("failed to build IAM tag: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .create_role()
            .role_name(request.name)
            .assume_role_policy_document(policy::assume_role_policy(&spec.trusted_service))
            .description(format!("execution role for {}", request.id))
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        for policy_arn in &spec.managed_policies {
            follow_up(&self.retry, "AttachRolePolicy", || async {
                self.client
                    .attach_role_policy()
                    .role_name(request.name)
                    .policy_arn(policy_arn)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| classify(&e))
            })
            .await?;
            debug!(role = %request.name, policy = %policy_arn, "managed policy attached");
        }

        output
            .role()
            .map(attributes)
            .ok_or_else(|| ProviderError::api("MissingRole", "CreateRole returned no role"))
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        let mut tags = TagMap::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_role_tags()
                .role_name(id)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify(&e))?;

            for tag in output.tags() {
                tags.insert(tag.key().to_string(), tag.value().to_string());
            }

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(tags)
    }
}

/// Writes an inline policy on a role, replacing any policy of the same name
pub(crate) async fn put_inline_policy(
    client: &Client,
    role_name: &str,
    policy_name: &str,
    document: &str,
) -> Result<(), ProviderError> {
    info!(role = %role_name, policy = %policy_name, "Putting inline role policy");
    client
        .put_role_policy()
        .role_name(role_name)
        .policy_name(policy_name)
        .policy_document(document)
        .send()
        .await
        .map_err(|e| classify(&e))?;
    Ok(())
}
