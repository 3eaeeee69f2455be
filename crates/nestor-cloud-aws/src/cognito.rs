//! Cognito user pools
//!
//! Pools live in the identity region, which may differ from the region of
//! every other resource.

use crate::context::AwsContext;
use crate::error::classify;
use crate::sdk::{Present, TagsField, tag_hash_map};
use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::Client;
use aws_sdk_cognitoidentityprovider::types::UserPoolType;
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, ProviderError, ResourceKind, ResourceProvider,
    TagMap,
};
use tracing::info;

const PAGE_SIZE: i32 = 60;

pub struct UserPoolProvider {
    client: Client,
}

impl UserPoolProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cognito_client(),
        }
    }

    async fn describe(&self, pool_id: &str) -> Result<UserPoolType, ProviderError> {
        self.client
            .describe_user_pool()
            .user_pool_id(pool_id)
            .send()
            .await
            .map_err(|e| classify(&e))?
            .user_pool()
            .cloned()
            .ok_or_else(|| ProviderError::api("MissingUserPool", format!("user pool {pool_id} not described")))
    }
}

fn attributes(pool: &UserPoolType) -> Result<Attributes, ProviderError> {
    let id = pool
        .id()
        .present()
        .ok_or_else(|| ProviderError::api("MissingId", "user pool has no id"))?;
    let arn = pool
        .arn()
        .present()
        .ok_or_else(|| ProviderError::api("MissingArn", format!("user pool {id} has no ARN")))?;
    Ok(Attributes::from([
        (AttributeName::Arn, arn.to_string()),
        (AttributeName::Id, id.to_string()),
    ]))
}

#[async_trait]
impl ResourceProvider for UserPoolProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::UserPool
    }

    /// Pool names are not unique; the first pool with the name wins
    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_user_pools()
                .max_results(PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify(&e))?;

            let found = output
                .user_pools()
                .iter()
                .find(|pool| pool.name().present() == Some(name))
                .and_then(|pool| pool.id().present());
            if let Some(pool_id) = found {
                let pool = self.describe(pool_id).await?;
                return Ok(Some(ExistingResource {
                    id: pool_id.to_string(),
                    attributes: attributes(&pool)?,
                }));
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn create(&self, request: &CreateRequest<'_>) -> Result<Attributes, ProviderError> {
        info!(pool = %request.name, "Creating Cognito user pool");

        let output = self
            .client
            .create_user_pool()
            .pool_name(request.name)
            .set_user_pool_tags(Some(tag_hash_map(request.tags)))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let pool = output
            .user_pool()
            .ok_or_else(|| ProviderError::api("MissingUserPool", "CreateUserPool returned no pool"))?;
        attributes(pool)
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        let pool = self.describe(id).await?;
        Ok(pool.user_pool_tags().to_tag_map())
    }
}
