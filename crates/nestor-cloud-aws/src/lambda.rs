//! Lambda functions
//!
//! Functions are created from a prebuilt zip archive. The execution role is
//! declared as a separate resource and handed to `create` as a reference.

use crate::context::AwsContext;
use crate::error::{AwsError, classify};
use crate::sdk::{Present, TagsField, tag_hash_map};
use async_trait::async_trait;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime};
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, FunctionSpec, ProviderError, ResourceKind,
    ResourceProvider, ResourceSpec, TagMap,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub struct FunctionProvider {
    client: Client,
}

fn attributes(arn: &str, name: &str) -> Attributes {
    Attributes::from([
        (AttributeName::Arn, arn.to_string()),
        (AttributeName::Name, name.to_string()),
    ])
}

pub(crate) async fn read_package(path: &Path) -> Result<Blob, AwsError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| AwsError::Package {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Blob::new(bytes))
}

pub(crate) fn environment(variables: &BTreeMap<String, String>) -> Environment {
    Environment::builder()
        .set_variables(Some(variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
        .build()
}

/// Lambda takes memory and timeout as `i32`
fn sdk_int(field: &str, value: Option<u32>) -> Result<Option<i32>, ProviderError> {
    value
        .map(|v| i32::try_from(v).map_err(|_| ProviderError::InvalidInput(format!("{field} {v} is out of range"))))
        .transpose()
}

impl FunctionProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.lambda_client(),
        }
    }
}

#[async_trait]
impl ResourceProvider for FunctionProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        match self.client.get_function().function_name(name).send().await {
            Ok(output) => {
                let arn = output
                    .configuration()
                    .and_then(|configuration| configuration.function_arn())
                    .present()
                    .ok_or_else(|| ProviderError::api("MissingArn", format!("function {name} has no ARN")))?;
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
        let ResourceSpec::Function(spec) = request.spec else {
            return Err(ProviderError::InvalidInput(format!(
                "{} has no function settings",
                request.id
            )));
        };
        let FunctionSpec {
            runtime,
            handler,
            code,
            environment: variables,
            memory_mb,
            timeout_secs,
        } = spec;

        let role_arn = request
            .reference(ResourceKind::Role)
            .and_then(|role| role.attribute(AttributeName::Arn))
            .ok_or_else(|| ProviderError::InvalidInput(format!("{} has no execution role", request.id)))?;

        let zip = read_package(code)
            .await
            .map_err(|e| ProviderError::InvalidInput(e.to_string()))?;

        info!(function = %request.name, runtime = %runtime, role = %role_arn, "Creating Lambda function");
        let output = self
            .client
            .create_function()
            .function_name(request.name)
            .runtime(Runtime::from(runtime.as_str()))
            .role(role_arn)
            .handler(handler)
            .code(FunctionCode::builder().zip_file(zip).build())
            .environment(environment(variables))
            .set_memory_size(sdk_int("memory_mb", *memory_mb)?)
            .set_timeout(sdk_int("timeout_secs", *timeout_secs)?)
            .set_tags(Some(tag_hash_map(request.tags)))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let arn = output
            .function_arn()
            .present()
            .ok_or_else(|| ProviderError::api("MissingArn", "CreateFunction returned no ARN"))?;
        Ok(attributes(arn, request.name))
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        let output = self
            .client
            .list_tags()
            .resource(id)
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
    fn test_sdk_int_rejects_overflow() {
        assert_eq!(sdk_int("memory_mb", Some(512)).unwrap(), Some(512));
        assert_eq!(sdk_int("timeout_secs", None).unwrap(), None);

        let err = sdk_int("memory_mb", Some(u32::MAX)).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(ref message) if message.contains("memory_mb")));
    }
}
