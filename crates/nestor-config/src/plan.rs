//! Conversion of a validated config into a deployment plan

use crate::error::Result;
use crate::model::{LambdaDeployment, NestorConfig, env_map};
use nestor_cloud::{
    DeclaredResource, DeploymentIdentity, DeploymentPlan, FunctionSpec, LogicalResourceId, NameTemplate,
    ResourceKind, ResourceSpec, RoleSpec, WiringRule,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

pub const LOG_GROUP_TEMPLATE: &str = "/nestor/{app}/{env}/{id}";

pub fn identity(config: &NestorConfig, environment: &str) -> DeploymentIdentity {
    DeploymentIdentity {
        app_name: config.application.name.clone(),
        environment: environment.to_string(),
        schema_version: config.nestor.clone(),
    }
}

/// Declared resources and wiring rules for one environment.
///
/// Each lambda becomes an execution role plus a function depending on it.
/// Wiring rules are ordered grants, then bucket triggers, then routes.
pub fn build_plan(config: &NestorConfig, environment: &str) -> Result<DeploymentPlan> {
    let mut plan = DeploymentPlan::new(identity(config, environment));
    let resources = &config.resources;

    let simple = [
        (ResourceKind::UserPool, &resources.cognito_user_pool),
        (ResourceKind::Table, &resources.dynamodb_table),
        (ResourceKind::EventBus, &resources.eventbridge_bus),
        (ResourceKind::Bucket, &resources.s3_bucket),
    ];
    for (kind, declared) in simple {
        plan.resources
            .extend(declared.iter().map(|r| DeclaredResource::new(kind, &r.id)));
    }
    plan.resources.extend(resources.cloudwatchlogs_group.iter().map(|r| {
        DeclaredResource::new(ResourceKind::LogGroup, &r.id).with_template(NameTemplate::new(LOG_GROUP_TEMPLATE))
    }));

    for function in &resources.lambda_function {
        let role = DeclaredResource::new(ResourceKind::Role, &function.id)
            .with_spec(ResourceSpec::Role(RoleSpec::default()));
        let role_id = role.id.clone();
        plan.resources.push(role);
        plan.resources.push(
            DeclaredResource::new(ResourceKind::Function, &function.id)
                .depends_on(role_id)
                .with_spec(ResourceSpec::Function(FunctionSpec {
                    runtime: function.runtime.clone(),
                    handler: function.handler.clone(),
                    code: function.code.clone(),
                    environment: env_map(&function.environment),
                    memory_mb: function.memory_mb,
                    timeout_secs: function.timeout_secs,
                })),
        );

        let function_id = LogicalResourceId::new(ResourceKind::Function, &function.id);
        for permission in &function.permissions {
            plan.wiring.push(WiringRule::Grant {
                function: function_id.clone(),
                resource: LogicalResourceId::from(permission.resource_id.as_str()),
                operations: permission.actions.iter().map(|a| a.operation.clone()).collect(),
            });
        }
    }

    for trigger in &config.triggers.s3copy {
        for target in &trigger.lambdas {
            plan.wiring.push(WiringRule::InvokeFromBucket {
                bucket: LogicalResourceId::from(trigger.bucket_id.as_str()),
                function: LogicalResourceId::from(target.lambda_id.as_str()),
                prefix: target.prefix.clone(),
                suffix: target.suffix.clone(),
            });
        }
    }

    for api in &resources.apigateway_http {
        let mut declared = DeclaredResource::new(ResourceKind::HttpApi, &api.id);
        if let Some(target) = &api.target_lambda_id {
            let function = LogicalResourceId::from(target.as_str());
            declared = declared.depends_on(function.clone());
            plan.wiring.push(WiringRule::Route {
                api: declared.id.clone(),
                function,
            });
        }
        plan.resources.push(declared);
    }

    plan.validate()?;
    debug!(
        resources = plan.resources.len(),
        wiring = plan.wiring.len(),
        identity = %plan.identity,
        "Deployment plan built"
    );
    Ok(plan)
}

/// A code update for one declared lambda
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDeployment {
    pub id: LogicalResourceId,
    pub function_name: String,
    pub file: PathBuf,
    pub handler: Option<String>,
    pub environment: Option<BTreeMap<String, String>>,
}

/// Code updates listed under `deployments`, resolved to physical function names
pub fn planned_deployments(config: &NestorConfig, plan: &DeploymentPlan) -> Vec<PlannedDeployment> {
    config
        .deployments
        .lambda_function
        .iter()
        .filter_map(|deployment: &LambdaDeployment| {
            let id = LogicalResourceId::new(ResourceKind::Function, &deployment.id);
            let declared = plan.resource(&id)?;
            Some(PlannedDeployment {
                function_name: declared.physical_name(&plan.identity),
                id,
                file: deployment.file.clone(),
                handler: deployment.handler.clone(),
                environment: deployment.environment.as_deref().map(env_map),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config;

    const SHOP: &str = r#"
nestor: "1"
application:
  name: shop
resources:
  s3_bucket: [{ id: upload }]
  cloudwatchlogs_group: [{ id: access }]
  lambda_function:
    - id: worker
      runtime: nodejs20.x
      code: build/worker.zip
      environment: [{ name: STAGE, value: prod }]
      permissions:
        - resource_id: resources.s3_bucket.upload
          actions: [{ operation: read }]
  apigateway_http:
    - { id: public, target_lambda_id: resources.lambda_function.worker }
triggers:
  s3copy:
    - bucket_id: resources.s3_bucket.upload
      lambdas: [{ lambda_id: resources.lambda_function.worker, suffix: ".json" }]
deployments:
  lambda_function: [{ id: worker, file: build/worker-v2.zip }]
"#;

    #[test]
    fn test_lambda_expands_to_role_and_function() {
        let plan = build_plan(&parse_config(SHOP).unwrap(), "prod").unwrap();
        let role = LogicalResourceId::new(ResourceKind::Role, "worker");
        let function = plan
            .resource(&LogicalResourceId::new(ResourceKind::Function, "worker"))
            .unwrap();

        assert!(plan.resource(&role).is_some());
        assert_eq!(function.depends_on, vec![role]);
        match &function.spec {
            ResourceSpec::Function(spec) => {
                assert_eq!(spec.handler, "index.handler");
                assert_eq!(spec.environment.get("STAGE").map(String::as_str), Some("prod"));
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_ordering_puts_role_before_function_before_api() {
        let plan = build_plan(&parse_config(SHOP).unwrap(), "prod").unwrap();
        let ordered = plan.ordered().unwrap();
        let order: Vec<&str> = ordered.iter().map(|r| r.id.as_str()).collect();
        let position = |id: &str| order.iter().position(|o| *o == id).unwrap();

        assert!(position("resources.iam_role.worker") < position("resources.lambda_function.worker"));
        assert!(position("resources.lambda_function.worker") < position("resources.apigateway_http.public"));
    }

    #[test]
    fn test_wiring_rules() {
        let plan = build_plan(&parse_config(SHOP).unwrap(), "prod").unwrap();
        let relations: Vec<&str> = plan.wiring.iter().map(WiringRule::relation).collect();
        assert_eq!(relations, vec!["grant", "invoke-from-bucket", "route"]);
        assert_eq!(plan.wiring[1].statement_id(), "sid-upload-worker");
        assert_eq!(plan.wiring[2].statement_id(), "sid-public-worker");
    }

    #[test]
    fn test_physical_names() {
        let plan = build_plan(&parse_config(SHOP).unwrap(), "prod").unwrap();
        let name = |kind, id| {
            plan.resource(&LogicalResourceId::new(kind, id))
                .unwrap()
                .physical_name(&plan.identity)
        };
        assert_eq!(name(ResourceKind::Bucket, "upload"), "shop-prod-upload");
        assert_eq!(name(ResourceKind::LogGroup, "access"), "/nestor/shop/prod/access");
        assert_eq!(plan.identity.schema_version, "1");
    }

    #[test]
    fn test_planned_deployments() {
        let config = parse_config(SHOP).unwrap();
        let plan = build_plan(&config, "staging").unwrap();
        let deployments = planned_deployments(&config, &plan);

        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].function_name, "shop-staging-worker");
        assert_eq!(deployments[0].file, PathBuf::from("build/worker-v2.zip"));
        assert_eq!(deployments[0].handler, None);
    }
}
