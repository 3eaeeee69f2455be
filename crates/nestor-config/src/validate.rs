//! Static checks run before a plan is built

use crate::error::{ConfigError, Result};
use crate::model::NestorConfig;
use nestor_cloud::{LogicalResourceId, ResourceKind, tags};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Memory sizes Lambda accepts, in MB
const MEMORY_MB: RangeInclusive<u32> = 128..=10_240;
/// Timeouts Lambda accepts, in seconds
const TIMEOUT_SECS: RangeInclusive<u32> = 1..=900;

/// Every logical id the config declares, by kind
fn declared(config: &NestorConfig, issues: &mut Vec<String>) -> BTreeSet<LogicalResourceId> {
    let resources = &config.resources;
    let groups: [(ResourceKind, Vec<&str>); 7] = [
        (ResourceKind::UserPool, resources.cognito_user_pool.iter().map(|r| r.id.as_str()).collect()),
        (ResourceKind::Table, resources.dynamodb_table.iter().map(|r| r.id.as_str()).collect()),
        (ResourceKind::EventBus, resources.eventbridge_bus.iter().map(|r| r.id.as_str()).collect()),
        (ResourceKind::Bucket, resources.s3_bucket.iter().map(|r| r.id.as_str()).collect()),
        (ResourceKind::LogGroup, resources.cloudwatchlogs_group.iter().map(|r| r.id.as_str()).collect()),
        (ResourceKind::Function, resources.lambda_function.iter().map(|r| r.id.as_str()).collect()),
        (ResourceKind::HttpApi, resources.apigateway_http.iter().map(|r| r.id.as_str()).collect()),
    ];

    let mut ids = BTreeSet::new();
    for (kind, names) in groups {
        for name in names {
            if !is_valid_id(name) {
                issues.push(format!("{kind}: invalid id '{name}' (use letters, digits, '-' and '_')"));
                continue;
            }
            if !ids.insert(LogicalResourceId::new(kind, name)) {
                issues.push(format!("{kind}: duplicate id '{name}'"));
            }
        }
    }
    ids
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Kind encoded in a `resources.<kind>.<id>` reference
fn reference_kind(reference: &str) -> Option<ResourceKind> {
    let mut parts = reference.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("resources"), Some(key), Some(_), None) => ResourceKind::from_config_key(key),
        _ => None,
    }
}

fn check_reference(
    ids: &BTreeSet<LogicalResourceId>,
    reference: &str,
    allowed: &[ResourceKind],
    context: &str,
    issues: &mut Vec<String>,
) -> Option<ResourceKind> {
    let Some(kind) = reference_kind(reference) else {
        issues.push(format!("{context}: '{reference}' is not a resource reference"));
        return None;
    };
    if !allowed.contains(&kind) {
        issues.push(format!("{context}: '{reference}' must refer to a {}", kind_list(allowed)));
        return None;
    }
    if !ids.contains(&LogicalResourceId::from(reference)) {
        issues.push(format!("{context}: '{reference}' is not declared"));
        return None;
    }
    Some(kind)
}

fn kind_list(kinds: &[ResourceKind]) -> String {
    kinds.iter().map(ResourceKind::config_key).collect::<Vec<_>>().join(" or ")
}

pub fn validate(config: &NestorConfig) -> Result<()> {
    let mut issues = Vec::new();

    if config.nestor != tags::SCHEMA_VERSION {
        issues.push(format!(
            "unsupported schema version '{}' (expected '{}')",
            config.nestor,
            tags::SCHEMA_VERSION
        ));
    }
    if config.application.name.trim().is_empty() {
        issues.push("application.name must not be empty".to_string());
    }

    let ids = declared(config, &mut issues);

    for function in &config.resources.lambda_function {
        if function.runtime.trim().is_empty() {
            issues.push(format!("lambda_function.{}: runtime must not be empty", function.id));
        }
        if let Some(memory) = function.memory_mb.filter(|mb| !MEMORY_MB.contains(mb)) {
            issues.push(format!(
                "lambda_function.{}: memory_mb {memory} is outside {}..={}",
                function.id,
                MEMORY_MB.start(),
                MEMORY_MB.end()
            ));
        }
        if let Some(timeout) = function.timeout_secs.filter(|secs| !TIMEOUT_SECS.contains(secs)) {
            issues.push(format!(
                "lambda_function.{}: timeout_secs {timeout} is outside {}..={}",
                function.id,
                TIMEOUT_SECS.start(),
                TIMEOUT_SECS.end()
            ));
        }
        for permission in &function.permissions {
            let context = format!("lambda_function.{} permissions", function.id);
            let Some(kind) = check_reference(
                &ids,
                &permission.resource_id,
                &[ResourceKind::Bucket, ResourceKind::Table],
                &context,
                &mut issues,
            ) else {
                continue;
            };
            if permission.actions.is_empty() {
                issues.push(format!("{context}: no actions for '{}'", permission.resource_id));
            }
            for action in &permission.actions {
                if !kind.grant_operations().contains(&action.operation.as_str()) {
                    issues.push(format!(
                        "{context}: unknown operation '{}' for {kind} (expected one of {})",
                        action.operation,
                        kind.grant_operations().join(", ")
                    ));
                }
            }
        }
    }

    for api in &config.resources.apigateway_http {
        if let Some(target) = &api.target_lambda_id {
            let context = format!("apigateway_http.{}", api.id);
            check_reference(&ids, target, &[ResourceKind::Function], &context, &mut issues);
        }
    }

    for trigger in &config.triggers.s3copy {
        let context = format!("triggers.s3copy {}", trigger.bucket_id);
        check_reference(&ids, &trigger.bucket_id, &[ResourceKind::Bucket], &context, &mut issues);
        let mut seen = BTreeSet::new();
        for target in &trigger.lambdas {
            check_reference(&ids, &target.lambda_id, &[ResourceKind::Function], &context, &mut issues);
            if !seen.insert(target.lambda_id.as_str()) {
                issues.push(format!("{context}: '{}' listed twice", target.lambda_id));
            }
        }
    }

    let mut deployed = BTreeSet::new();
    for deployment in &config.deployments.lambda_function {
        let id = LogicalResourceId::new(ResourceKind::Function, &deployment.id);
        if !ids.contains(&id) {
            issues.push(format!("deployments.lambda_function: '{}' is not a declared lambda", deployment.id));
        }
        if !deployed.insert(deployment.id.as_str()) {
            issues.push(format!("deployments.lambda_function: '{}' listed twice", deployment.id));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> NestorConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn issues(yaml: &str) -> Vec<String> {
        match validate(&parse(yaml)) {
            Err(ConfigError::Invalid(issues)) => issues,
            other => panic!("expected validation issues, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = parse(
            r#"
nestor: "1"
application: { name: shop }
resources:
  s3_bucket: [{ id: store }]
  dynamodb_table: [{ id: orders }]
  lambda_function:
    - id: worker
      runtime: nodejs20.x
      code: build/worker.zip
      permissions:
        - resource_id: resources.s3_bucket.store
          actions: [{ operation: read }, { operation: list }]
        - resource_id: resources.dynamodb_table.orders
          actions: [{ operation: query }]
  apigateway_http:
    - { id: public, target_lambda_id: resources.lambda_function.worker }
triggers:
  s3copy:
    - bucket_id: resources.s3_bucket.store
      lambdas: [{ lambda_id: resources.lambda_function.worker, prefix: "in/" }]
deployments:
  lambda_function: [{ id: worker, file: build/worker.zip }]
"#,
        );
        validate(&config).unwrap();
    }

    #[test]
    fn test_duplicate_ids() {
        let issues = issues(
            r#"
nestor: "1"
application: { name: shop }
resources:
  s3_bucket: [{ id: store }, { id: store }]
  dynamodb_table: [{ id: store }]
"#,
        );
        assert_eq!(issues, vec!["s3_bucket: duplicate id 'store'".to_string()]);
    }

    #[test]
    fn test_undeclared_reference() {
        let issues = issues(
            r#"
nestor: "1"
application: { name: shop }
resources:
  apigateway_http:
    - { id: public, target_lambda_id: resources.lambda_function.missing }
"#,
        );
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("is not declared"), "{issues:?}");
    }

    #[test]
    fn test_unknown_operation() {
        let issues = issues(
            r#"
nestor: "1"
application: { name: shop }
resources:
  dynamodb_table: [{ id: orders }]
  lambda_function:
    - id: worker
      runtime: nodejs20.x
      code: worker.zip
      permissions:
        - resource_id: resources.dynamodb_table.orders
          actions: [{ operation: list }]
"#,
        );
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("unknown operation 'list'"), "{issues:?}");
    }

    #[test]
    fn test_permission_on_wrong_kind() {
        let issues = issues(
            r#"
nestor: "1"
application: { name: shop }
resources:
  eventbridge_bus: [{ id: events }]
  lambda_function:
    - id: worker
      runtime: nodejs20.x
      code: worker.zip
      permissions:
        - resource_id: resources.eventbridge_bus.events
          actions: [{ operation: read }]
"#,
        );
        assert!(issues[0].contains("must refer to a s3_bucket or dynamodb_table"), "{issues:?}");
    }

    #[test]
    fn test_reports_every_issue() {
        let issues = issues(
            r#"
nestor: "2"
application: { name: "" }
deployments:
  lambda_function: [{ id: ghost, file: ghost.zip }]
"#,
        );
        assert_eq!(issues.len(), 3, "{issues:?}");
    }

    #[test]
    fn test_invalid_id() {
        let issues = issues(
            r#"
nestor: "1"
application: { name: shop }
resources:
  s3_bucket: [{ id: "my.bucket" }]
"#,
        );
        assert!(issues[0].contains("invalid id 'my.bucket'"));
    }

    #[test]
    fn test_function_limits() {
        let issues = issues(
            r#"
nestor: "1"
application: { name: shop }
resources:
  lambda_function:
    - { id: worker, runtime: nodejs20.x, code: build/worker.zip, memory_mb: 4294967295, timeout_secs: 0 }
"#,
        );
        assert_eq!(issues.len(), 2, "{issues:?}");
        assert!(issues[0].contains("memory_mb 4294967295 is outside 128..=10240"));
        assert!(issues[1].contains("timeout_secs 0 is outside 1..=900"));
    }
}
