use super::{Target, aws_settings};
use colored::Colorize;
use nestor_cloud::RetryConfig;
use nestor_cloud_aws::{AwsContext, FunctionDeployment, deploy_function};
use nestor_config::{PlannedDeployment, planned_deployments};

/// Deployments to run, narrowed to `only` when given
fn select(planned: Vec<PlannedDeployment>, only: Option<&str>) -> anyhow::Result<Vec<PlannedDeployment>> {
    if planned.is_empty() {
        anyhow::bail!("no deployments declared under deployments.lambda_function");
    }
    let Some(only) = only else {
        return Ok(planned);
    };

    let available: Vec<String> = planned.iter().map(|d| d.id.short_name().to_string()).collect();
    let selected: Vec<_> = planned
        .into_iter()
        .filter(|d| d.id.short_name() == only || d.id.as_str() == only)
        .collect();
    if selected.is_empty() {
        anyhow::bail!(
            "no deployment for function '{}'. Available: {}",
            only,
            available.join(", ")
        );
    }
    Ok(selected)
}

pub async fn handle(target: &Target, only: Option<&str>) -> anyhow::Result<()> {
    let loaded = target.load()?;
    let selected = select(planned_deployments(&loaded.config, &loaded.plan), only)?;
    loaded.print_header();

    let aws = AwsContext::load(&aws_settings(&loaded.config)?).await?;
    let retry = RetryConfig::default();

    for planned in selected {
        println!("{} {}", "Deploying".blue().bold(), planned.function_name.cyan());
        let deployment = FunctionDeployment {
            id: planned.id,
            function_name: planned.function_name,
            package: planned.file,
            handler: planned.handler,
            environment: planned.environment,
        };
        let outcome = deploy_function(&aws, &loaded.plan.identity, &deployment, &retry).await?;
        println!(
            "  {} {} {}",
            "✓".green(),
            outcome.function_arn,
            outcome.code_sha256.unwrap_or_default().dimmed()
        );
    }

    println!("{}", "✓ Deploy complete".green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestor_cloud::{LogicalResourceId, ResourceKind};
    use std::path::PathBuf;

    fn planned(id: &str) -> PlannedDeployment {
        PlannedDeployment {
            id: LogicalResourceId::new(ResourceKind::Function, id),
            function_name: format!("shop-dev-{id}"),
            file: PathBuf::from(format!("{id}.zip")),
            handler: None,
            environment: None,
        }
    }

    #[test]
    fn test_select_all() {
        let selected = select(vec![planned("a"), planned("b")], None).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_select_by_short_or_full_id() {
        let selected = select(vec![planned("a"), planned("b")], Some("b")).unwrap();
        assert_eq!(selected[0].function_name, "shop-dev-b");

        let selected = select(vec![planned("a")], Some("resources.lambda_function.a")).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_select_unknown_function() {
        let err = select(vec![planned("a")], Some("c")).unwrap_err();
        assert!(err.to_string().contains("Available: a"));
    }

    #[test]
    fn test_nothing_to_deploy() {
        assert!(select(Vec::new(), None).is_err());
    }
}
