//! Cross-resource wiring on AWS

use crate::apigateway::{self, execute_api_arn};
use crate::context::AwsContext;
use crate::error::{classify, is_not_found_code};
use crate::iam;
use crate::policy;
use crate::s3;
use crate::sdk::{Present, arn_resource_name};
use async_trait::async_trait;
use aws_sdk_lambda::error::ProvideErrorMetadata;
use nestor_cloud::{
    AccessGrant, AttributeName, InvokePermission, NotificationTarget, ProviderError, RegisteredResource,
    ResourceKind, WiringProvider,
};
use tracing::{debug, info};

const INVOKE_ACTION: &str = "lambda:InvokeFunction";
const S3_PRINCIPAL: &str = "s3.amazonaws.com";
const APIGATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";

pub struct AwsWiring {
    lambda: aws_sdk_lambda::Client,
    iam: aws_sdk_iam::Client,
    s3: aws_sdk_s3::Client,
    apigateway: aws_sdk_apigatewayv2::Client,
    region: String,
    account_id: String,
}

fn required<'a>(resource: &'a RegisteredResource, attribute: AttributeName) -> Result<&'a str, ProviderError> {
    resource
        .attribute(attribute)
        .ok_or_else(|| ProviderError::InvalidInput(format!("{} has no {attribute}", resource.id)))
}

impl AwsWiring {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            lambda: ctx.lambda_client(),
            iam: ctx.iam_client(),
            s3: ctx.s3_client(),
            apigateway: ctx.apigateway_client(),
            region: ctx.region().to_string(),
            account_id: ctx.account_id().to_string(),
        }
    }

    /// Name of the execution role attached to a function
    async fn execution_role(&self, function_name: &str) -> Result<String, ProviderError> {
        let configuration = self
            .lambda
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        configuration
            .role()
            .present()
            .map(|arn| arn_resource_name(arn).to_string())
            .ok_or_else(|| ProviderError::api("MissingRole", format!("function {function_name} has no role")))
    }
}

#[async_trait]
impl WiringProvider for AwsWiring {
    async fn grant_access(&self, grant: &AccessGrant) -> Result<(), ProviderError> {
        let function_name = required(&grant.function, AttributeName::Name)?;
        let role_name = self.execution_role(function_name).await?;
        let document = policy::access_policy(&grant.statement_id, &grant.targets)?;
        debug!(role = %role_name, policy = %document, "access policy");

        iam::put_inline_policy(&self.iam, &role_name, &grant.statement_id, &document).await
    }

    async fn remove_invoke_permission(
        &self,
        function: &RegisteredResource,
        statement_id: &str,
    ) -> Result<(), ProviderError> {
        let function_name = required(function, AttributeName::Name)?;
        match self
            .lambda
            .remove_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .send()
            .await
        {
            Ok(_) => {
                debug!(function = %function_name, statement_id, "invoke permission removed");
                Ok(())
            }
            Err(e) if is_not_found_code(e.code()) => Ok(()),
            Err(e) => Err(classify(&e)),
        }
    }

    async fn add_invoke_permission(&self, permission: &InvokePermission) -> Result<(), ProviderError> {
        let function_name = required(&permission.function, AttributeName::Name)?;
        let request = self
            .lambda
            .add_permission()
            .function_name(function_name)
            .statement_id(&permission.statement_id)
            .action(INVOKE_ACTION);

        let request = match permission.source.kind {
            ResourceKind::Bucket => request
                .principal(S3_PRINCIPAL)
                .source_arn(required(&permission.source, AttributeName::Arn)?)
                .source_account(&self.account_id),
            ResourceKind::HttpApi => {
                let api_id = required(&permission.source, AttributeName::Id)?;
                request
                    .principal(APIGATEWAY_PRINCIPAL)
                    .source_arn(execute_api_arn(&self.region, &self.account_id, api_id))
            }
            other => {
                return Err(ProviderError::InvalidInput(format!(
                    "{other} cannot invoke a function"
                )));
            }
        };

        info!(function = %function_name, statement_id = %permission.statement_id, "Adding invoke permission");
        request.send().await.map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn put_bucket_notifications(
        &self,
        bucket: &RegisteredResource,
        targets: &[NotificationTarget],
    ) -> Result<(), ProviderError> {
        let bucket_name = required(bucket, AttributeName::Name)?;
        s3::put_function_notifications(&self.s3, bucket_name, targets).await
    }

    async fn attach_route(
        &self,
        api: &RegisteredResource,
        function: &RegisteredResource,
    ) -> Result<(), ProviderError> {
        let api_id = required(api, AttributeName::Id)?;
        let function_arn = required(function, AttributeName::Arn)?;
        apigateway::set_target(&self.apigateway, api_id, function_arn).await
    }
}
