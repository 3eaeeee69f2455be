//! Resource identifiers, kinds and declarations

use crate::tags::DeploymentIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Dotted, deployment-unique resource id such as `resources.s3_bucket.store`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalResourceId(String);

impl LogicalResourceId {
    pub fn new(kind: ResourceKind, name: &str) -> Self {
        Self(format!("resources.{}.{}", kind.config_key(), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment (`store` for `resources.s3_bucket.store`)
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for LogicalResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LogicalResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    UserPool,
    Table,
    EventBus,
    Bucket,
    HttpApi,
    LogGroup,
    Function,
    Role,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::UserPool,
        ResourceKind::Table,
        ResourceKind::EventBus,
        ResourceKind::Bucket,
        ResourceKind::HttpApi,
        ResourceKind::LogGroup,
        ResourceKind::Function,
        ResourceKind::Role,
    ];

    /// Segment used in logical ids and configuration keys
    pub fn config_key(&self) -> &'static str {
        match self {
            ResourceKind::UserPool => "cognito_user_pool",
            ResourceKind::Table => "dynamodb_table",
            ResourceKind::EventBus => "eventbridge_bus",
            ResourceKind::Bucket => "s3_bucket",
            ResourceKind::HttpApi => "apigateway_http",
            ResourceKind::LogGroup => "cloudwatchlogs_group",
            ResourceKind::Function => "lambda_function",
            ResourceKind::Role => "iam_role",
        }
    }

    pub fn from_config_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.config_key() == key)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResourceKind::UserPool => "Cognito user pool (identity region)",
            ResourceKind::Table => "DynamoDB table, on-demand billing, string partition key `id`",
            ResourceKind::EventBus => "EventBridge event bus",
            ResourceKind::Bucket => "S3 bucket",
            ResourceKind::HttpApi => "API Gateway HTTP API",
            ResourceKind::LogGroup => "CloudWatch Logs log group",
            ResourceKind::Function => "Lambda function",
            ResourceKind::Role => "IAM execution role",
        }
    }

    /// Attributes a provider registers after reconciling a resource of this kind
    pub fn attributes(&self) -> &'static [AttributeName] {
        match self {
            ResourceKind::UserPool => &[AttributeName::Arn, AttributeName::Id],
            ResourceKind::HttpApi => &[AttributeName::Id, AttributeName::Name, AttributeName::Endpoint],
            _ => &[AttributeName::Arn, AttributeName::Name],
        }
    }

    /// Operations a function can be granted on this kind; empty when not grantable
    pub fn grant_operations(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Bucket => &["read", "write", "delete", "list"],
            ResourceKind::Table => &["read", "query", "write", "delete"],
            _ => &[],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeName {
    Arn,
    Id,
    Name,
    /// Invoke URL of an HTTP API
    Endpoint,
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeName::Arn => "Arn",
            AttributeName::Id => "Id",
            AttributeName::Name => "Name",
            AttributeName::Endpoint => "Endpoint",
        };
        f.write_str(name)
    }
}

pub type Attributes = BTreeMap<AttributeName, String>;

/// A resource recorded in the registry after reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredResource {
    pub id: LogicalResourceId,
    pub kind: ResourceKind,
    pub attributes: Attributes,
}

impl RegisteredResource {
    pub fn attribute(&self, name: AttributeName) -> Option<&str> {
        self.attributes.get(&name).map(String::as_str)
    }

    pub fn require(&self, name: AttributeName) -> crate::Result<&str> {
        self.attribute(name)
            .ok_or_else(|| crate::CloudError::MissingAttribute {
                id: self.id.clone(),
                attribute: name,
            })
    }
}

/// Physical name pattern; `{app}`, `{env}` and `{id}` are substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate(String);

impl NameTemplate {
    pub const DEFAULT: &'static str = "{app}-{env}-{id}";

    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn render(&self, identity: &DeploymentIdentity, id: &LogicalResourceId) -> String {
        self.0
            .replace("{app}", &identity.app_name)
            .replace("{env}", &identity.environment)
            .replace("{id}", id.short_name())
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

/// Lambda function settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub runtime: String,
    pub handler: String,
    /// Path to a prebuilt zip archive
    pub code: PathBuf,
    pub environment: BTreeMap<String, String>,
    pub memory_mb: Option<u32>,
    pub timeout_secs: Option<u32>,
}

/// Execution role settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    /// Service principal allowed to assume the role
    pub trusted_service: String,
    pub managed_policies: Vec<String>,
}

impl Default for RoleSpec {
    fn default() -> Self {
        Self {
            trusted_service: "lambda.amazonaws.com".to_string(),
            managed_policies: vec![
                "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole".to_string(),
            ],
        }
    }
}

/// Kind specific creation settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResourceSpec {
    #[default]
    Default,
    Function(FunctionSpec),
    Role(RoleSpec),
}

/// One resource the deployment wants to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredResource {
    pub id: LogicalResourceId,
    pub kind: ResourceKind,
    pub name_template: NameTemplate,
    pub depends_on: Vec<LogicalResourceId>,
    pub spec: ResourceSpec,
}

impl DeclaredResource {
    pub fn new(kind: ResourceKind, name: &str) -> Self {
        Self {
            id: LogicalResourceId::new(kind, name),
            kind,
            name_template: NameTemplate::default(),
            depends_on: Vec::new(),
            spec: ResourceSpec::Default,
        }
    }

    pub fn with_template(mut self, template: NameTemplate) -> Self {
        self.name_template = template;
        self
    }

    pub fn depends_on(mut self, id: LogicalResourceId) -> Self {
        self.depends_on.push(id);
        self
    }

    pub fn with_spec(mut self, spec: ResourceSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn physical_name(&self, identity: &DeploymentIdentity) -> String {
        self.name_template.render(identity, &self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_id_layout() {
        let id = LogicalResourceId::new(ResourceKind::Bucket, "store");
        assert_eq!(id.as_str(), "resources.s3_bucket.store");
        assert_eq!(id.short_name(), "store");
    }

    #[test]
    fn test_config_key_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_config_key(kind.config_key()), Some(kind));
        }
        assert_eq!(ResourceKind::from_config_key("ec2_instance"), None);
    }

    #[test]
    fn test_grant_operations() {
        assert!(ResourceKind::Bucket.grant_operations().contains(&"list"));
        assert!(ResourceKind::Table.grant_operations().contains(&"query"));
        assert!(ResourceKind::EventBus.grant_operations().is_empty());
    }

    #[test]
    fn test_name_template() {
        let identity = DeploymentIdentity::new("shop", "prod");
        let resource = DeclaredResource::new(ResourceKind::Bucket, "store");
        assert_eq!(resource.physical_name(&identity), "shop-prod-store");

        let logs = DeclaredResource::new(ResourceKind::LogGroup, "access")
            .with_template(NameTemplate::new("/nestor/{app}/{env}/{id}"));
        assert_eq!(logs.physical_name(&identity), "/nestor/shop/prod/access");
    }

    #[test]
    fn test_http_api_registers_endpoint() {
        assert!(ResourceKind::HttpApi.attributes().contains(&AttributeName::Endpoint));
        assert!(!ResourceKind::Function.attributes().contains(&AttributeName::Endpoint));
        assert_eq!(AttributeName::Endpoint.to_string(), "Endpoint");
    }

    #[test]
    fn test_require_missing_attribute() {
        let resource = RegisteredResource {
            id: LogicalResourceId::new(ResourceKind::HttpApi, "public"),
            kind: ResourceKind::HttpApi,
            attributes: Attributes::from([(AttributeName::Id, "abc123".to_string())]),
        };
        assert_eq!(resource.require(AttributeName::Id).unwrap(), "abc123");
        assert!(resource.require(AttributeName::Arn).is_err());
    }
}
