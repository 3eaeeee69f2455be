//! API Gateway HTTP APIs

use crate::context::AwsContext;
use crate::error::classify;
use crate::sdk::{Present, TagsField, tag_hash_map};
use async_trait::async_trait;
use aws_sdk_apigatewayv2::Client;
use aws_sdk_apigatewayv2::types::ProtocolType;
use nestor_cloud::{
    AttributeName, Attributes, CreateRequest, ExistingResource, ProviderError, ResourceKind, ResourceProvider,
    TagMap,
};
use tracing::info;

pub struct HttpApiProvider {
    client: Client,
}

fn attributes(api_id: &str, name: &str, endpoint: Option<&str>) -> Attributes {
    let mut attributes = Attributes::from([
        (AttributeName::Id, api_id.to_string()),
        (AttributeName::Name, name.to_string()),
    ]);
    if let Some(endpoint) = endpoint {
        attributes.insert(AttributeName::Endpoint, endpoint.to_string());
    }
    attributes
}

/// Function the quick-create `$default` route integrates with
fn route_target<'a>(request: &'a CreateRequest<'_>) -> Option<&'a str> {
    request
        .reference(ResourceKind::Function)
        .and_then(|function| function.attribute(AttributeName::Arn))
}

/// Source ARN for invocations through the `$default` route
pub fn execute_api_arn(region: &str, account_id: &str, api_id: &str) -> String {
    format!("arn:aws:execute-api:{region}:{account_id}:{api_id}/*/$default")
}

impl HttpApiProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.apigateway_client(),
        }
    }
}

#[async_trait]
impl ResourceProvider for HttpApiProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::HttpApi
    }

    /// API names are not unique; the first API with the name wins
    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .get_apis()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify(&e))?;

            let found = output.items().iter().find(|api| api.name().present() == Some(name));
            if let Some(api) = found {
                let api_id = api
                    .api_id()
                    .present()
                    .ok_or_else(|| ProviderError::api("MissingId", format!("API {name} has no id")))?;
                return Ok(Some(ExistingResource {
                    id: api_id.to_string(),
                    attributes: attributes(api_id, name, api.api_endpoint().present()),
                }));
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn create(&self, request: &CreateRequest<'_>) -> Result<Attributes, ProviderError> {
        let target = route_target(request);
        info!(api = %request.name, target = ?target, "Creating HTTP API");

        // UpdateApi cannot add a target to an API created without one
        let output = self
            .client
            .create_api()
            .name(request.name)
            .protocol_type(ProtocolType::Http)
            .set_target(target.map(str::to_string))
            .set_tags(Some(tag_hash_map(request.tags)))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let api_id = output
            .api_id()
            .present()
            .ok_or_else(|| ProviderError::api("MissingId", "CreateApi returned no id"))?;
        Ok(attributes(api_id, request.name, output.api_endpoint().present()))
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        let output = self
            .client
            .get_api()
            .api_id(id)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(output.tags().to_tag_map())
    }
}

/// Points the API's quick-create route at a function
pub(crate) async fn set_target(client: &Client, api_id: &str, function_arn: &str) -> Result<(), ProviderError> {
    info!(api_id = %api_id, target = %function_arn, "Routing HTTP API to function");
    client
        .update_api()
        .api_id(api_id)
        .target(function_arn)
        .send()
        .await
        .map_err(|e| classify(&e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestor_cloud::{LogicalResourceId, RegisteredResource, ResourceSpec};

    fn request<'a>(
        id: &'a LogicalResourceId,
        tags: &'a TagMap,
        spec: &'a ResourceSpec,
        references: &'a [RegisteredResource],
    ) -> CreateRequest<'a> {
        CreateRequest {
            id,
            name: "app-dev-public",
            tags,
            spec,
            references,
        }
    }

    #[test]
    fn test_route_target_is_referenced_function() {
        let id = LogicalResourceId::new(ResourceKind::HttpApi, "public");
        let (tags, spec) = (TagMap::new(), ResourceSpec::Default);
        let worker = RegisteredResource {
            id: LogicalResourceId::new(ResourceKind::Function, "worker"),
            kind: ResourceKind::Function,
            attributes: Attributes::from([(
                AttributeName::Arn,
                "arn:aws:lambda:eu-west-1:123456789012:function:app-dev-worker".to_string(),
            )]),
        };

        let references = [worker];
        assert_eq!(
            route_target(&request(&id, &tags, &spec, &references)),
            Some("arn:aws:lambda:eu-west-1:123456789012:function:app-dev-worker")
        );
        assert_eq!(route_target(&request(&id, &tags, &spec, &[])), None);
    }

    #[test]
    fn test_attributes_carry_endpoint() {
        let endpoint = "https://a1b2c3.execute-api.eu-west-1.amazonaws.com";
        let registered = attributes("a1b2c3", "app-dev-public", Some(endpoint));
        assert_eq!(registered.get(&AttributeName::Endpoint).map(String::as_str), Some(endpoint));
        assert!(!attributes("a1b2c3", "app-dev-public", None).contains_key(&AttributeName::Endpoint));
    }

    #[test]
    fn test_execute_api_arn() {
        assert_eq!(
            execute_api_arn("eu-west-1", "123456789012", "a1b2c3"),
            "arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/*/$default"
        );
    }
}
