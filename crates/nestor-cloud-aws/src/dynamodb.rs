//! DynamoDB tables
//!
//! Tables are created on-demand with a single string partition key `id`.

use crate::context::AwsContext;
use crate::error::classify;
use crate::sdk::Present;
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableDescription, Tag,
};
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, ProviderError, ResourceKind, ResourceProvider,
    TagMap,
};
use tracing::info;

const PARTITION_KEY: &str = "id";

pub struct TableProvider {
    client: Client,
}

impl TableProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.dynamodb_client(),
        }
    }
}

fn build_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::InvalidInput(format!("failed to build DynamoDB request: {e}"))
}

fn attributes(table: &TableDescription, name: &str) -> Result<Attributes, ProviderError> {
    let arn = table
        .table_arn()
        .present()
        .ok_or_else(|| ProviderError::api("MissingArn", format!("table {name} has no ARN")))?;
    Ok(Attributes::from([
        (AttributeName::Arn, arn.to_string()),
        (AttributeName::Name, name.to_string()),
    ]))
}

#[async_trait]
impl ResourceProvider for TableProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Table
    }

    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        match self.client.describe_table().table_name(name).send().await {
            Ok(output) => match output.table() {
                Some(table) => {
                    let attributes = attributes(table, name)?;
                    Ok(Some(ExistingResource {
                        id: attributes[&AttributeName::Arn].clone(),
                        attributes,
                    }))
                }
                None => Ok(None),
            },
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
        info!(table = %request.name, "Creating DynamoDB table");

        let tags = request
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build().map_err(build_error))
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .create_table()
            .table_name(request.name)
            .billing_mode(BillingMode::PayPerRequest)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(PARTITION_KEY)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_error)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(PARTITION_KEY)
                    .key_type(KeyType::Hash)
                    .build()
                    .map_err(build_error)?,
            )
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let table = output
            .table_description()
            .ok_or_else(|| ProviderError::api("MissingTable", "CreateTable returned no description"))?;
        attributes(table, request.name)
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        let mut tags = TagMap::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_tags_of_resource()
                .resource_arn(id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify(&e))?;

            for tag in output.tags() {
                tags.insert(tag.key().to_string(), tag.value().to_string());
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(tags)
    }
}
