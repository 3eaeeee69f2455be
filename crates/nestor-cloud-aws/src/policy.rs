//! IAM policy documents

use nestor_cloud::{AttributeName, GrantTarget, ProviderError, ResourceKind};
use serde_json::{Value, json};

/// Trust policy letting `service` assume a role
pub fn assume_role_policy(service: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": service },
                "Action": "sts:AssumeRole"
            }
        ]
    })
    .to_string()
}

/// IAM actions behind one access operation
fn actions(kind: ResourceKind, operation: &str) -> Option<&'static [&'static str]> {
    let actions: &'static [&'static str] = match (kind, operation) {
        (ResourceKind::Bucket, "read") => &["s3:GetObject"],
        (ResourceKind::Bucket, "write") => &["s3:PutObject"],
        (ResourceKind::Bucket, "delete") => &["s3:DeleteObject"],
        (ResourceKind::Bucket, "list") => &["s3:ListBucket"],
        (ResourceKind::Table, "read") => &["dynamodb:GetItem"],
        (ResourceKind::Table, "query") => &["dynamodb:Query"],
        (ResourceKind::Table, "write") => &["dynamodb:PutItem", "dynamodb:UpdateItem"],
        (ResourceKind::Table, "delete") => &["dynamodb:DeleteItem"],
        _ => return None,
    };
    Some(actions)
}

fn resources(kind: ResourceKind, arn: &str) -> Vec<String> {
    match kind {
        ResourceKind::Bucket => vec![arn.to_string(), format!("{arn}/*")],
        ResourceKind::Table => vec![arn.to_string(), format!("{arn}/index/*")],
        _ => vec![arn.to_string()],
    }
}

fn statement(sid: String, target: &GrantTarget) -> Result<Value, ProviderError> {
    let resource = &target.resource;
    let arn = resource
        .attribute(AttributeName::Arn)
        .ok_or_else(|| ProviderError::InvalidInput(format!("{} has no Arn", resource.id)))?;

    let mut granted: Vec<&str> = Vec::new();
    for operation in &target.operations {
        let mapped = actions(resource.kind, operation).ok_or_else(|| {
            ProviderError::InvalidInput(format!("unsupported operation '{operation}' on {}", resource.kind))
        })?;
        for action in mapped {
            if !granted.contains(action) {
                granted.push(*action);
            }
        }
    }

    Ok(json!({
        "Sid": sid,
        "Effect": "Allow",
        "Action": granted,
        "Resource": resources(resource.kind, arn),
    }))
}

/// Inline policy with one statement per grant target.
///
/// Statement ids are sanitised to the characters IAM accepts in a `Sid` and
/// numbered when the policy holds more than one target.
pub fn access_policy(statement_id: &str, targets: &[GrantTarget]) -> Result<String, ProviderError> {
    let base: String = statement_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let statements = targets
        .iter()
        .enumerate()
        .map(|(index, target)| {
            let sid = if targets.len() == 1 {
                base.clone()
            } else {
                format!("{base}{index}")
            };
            statement(sid, target)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
    .to_string())
}
