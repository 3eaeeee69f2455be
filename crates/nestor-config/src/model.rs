//! `nestor.yml` schema

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_HANDLER: &str = "index.handler";

fn default_handler() -> String {
    DEFAULT_HANDLER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestorConfig {
    /// Schema version, written to every resource as the `nv` tag
    pub nestor: String,
    pub application: Application,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub triggers: Triggers,
    #[serde(default)]
    pub deployments: Deployments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Application {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Region hosting user pools; falls back to `region`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resources {
    #[serde(default)]
    pub cognito_user_pool: Vec<SimpleResource>,
    #[serde(default)]
    pub dynamodb_table: Vec<SimpleResource>,
    #[serde(default)]
    pub eventbridge_bus: Vec<SimpleResource>,
    #[serde(default)]
    pub s3_bucket: Vec<SimpleResource>,
    #[serde(default)]
    pub cloudwatchlogs_group: Vec<SimpleResource>,
    #[serde(default)]
    pub lambda_function: Vec<LambdaFunction>,
    #[serde(default)]
    pub apigateway_http: Vec<HttpApi>,
}

/// A resource declared by id alone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleResource {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LambdaFunction {
    pub id: String,
    pub runtime: String,
    #[serde(default = "default_handler")]
    pub handler: String,
    /// Prebuilt zip archive, relative to the config file
    pub code: PathBuf,
    #[serde(default)]
    pub environment: Vec<EnvVar>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Access from a lambda to another declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Permission {
    pub resource_id: String,
    pub actions: Vec<PermissionAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionAction {
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpApi {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lambda_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Triggers {
    /// Object-created notifications from a bucket to lambdas
    #[serde(default)]
    pub s3copy: Vec<BucketTrigger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketTrigger {
    pub bucket_id: String,
    pub lambdas: Vec<TriggerTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerTarget {
    pub lambda_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deployments {
    #[serde(default)]
    pub lambda_function: Vec<LambdaDeployment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LambdaDeployment {
    pub id: String,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Vec<EnvVar>>,
}

pub fn env_map(vars: &[EnvVar]) -> BTreeMap<String, String> {
    vars.iter().map(|v| (v.name.clone(), v.value.clone())).collect()
}

impl NestorConfig {
    /// Rebase relative artifact paths onto `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for function in &mut self.resources.lambda_function {
            if function.code.is_relative() {
                function.code = base.join(&function.code);
            }
        }
        for deployment in &mut self.deployments.lambda_function {
            if deployment.file.is_relative() {
                deployment.file = base.join(&deployment.file);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document() {
        let config: NestorConfig = serde_yaml::from_str(
            r#"
nestor: "1"
application:
  name: shop
"#,
        )
        .unwrap();
        assert_eq!(config.application.name, "shop");
        assert!(config.resources.s3_bucket.is_empty());
        assert!(config.triggers.s3copy.is_empty());
    }

    #[test]
    fn test_handler_default() {
        let function: LambdaFunction =
            serde_yaml::from_str("id: worker\nruntime: nodejs20.x\ncode: build/worker.zip\n").unwrap();
        assert_eq!(function.handler, DEFAULT_HANDLER);
        assert!(function.permissions.is_empty());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<NestorConfig, _> = serde_yaml::from_str(
            r#"
nestor: "1"
application:
  name: shop
  owner: someone
"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("owner"), "{err}");
    }

    #[test]
    fn test_resolve_paths() {
        let mut config: NestorConfig = serde_yaml::from_str(
            r#"
nestor: "1"
application: { name: shop }
resources:
  lambda_function:
    - { id: a, runtime: nodejs20.x, code: build/a.zip }
    - { id: b, runtime: nodejs20.x, code: /abs/b.zip }
deployments:
  lambda_function:
    - { id: a, file: build/a2.zip }
"#,
        )
        .unwrap();
        config.resolve_paths(Path::new("/project"));

        let functions = &config.resources.lambda_function;
        assert_eq!(functions[0].code, PathBuf::from("/project/build/a.zip"));
        assert_eq!(functions[1].code, PathBuf::from("/abs/b.zip"));
        assert_eq!(
            config.deployments.lambda_function[0].file,
            PathBuf::from("/project/build/a2.zip")
        );
    }
}
