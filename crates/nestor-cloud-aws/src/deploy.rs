//! Code deployment for provisioned functions

use crate::context::AwsContext;
use crate::error::{AwsError, classify};
use crate::lambda::{FunctionProvider, environment, read_package};
use crate::sdk::Present;
use nestor_cloud::tags::{self, DeploymentIdentity};
use nestor_cloud::{LogicalResourceId, ProviderError, ResourceProvider, RetryClass, RetryConfig, with_retry};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("function {0} does not exist; run `nestor provision` first")]
    NotProvisioned(String),

    #[error("function {name} is not owned by this deployment ({mismatch})")]
    NotOwned { name: String, mismatch: tags::TagMismatch },

    #[error(transparent)]
    Aws(#[from] AwsError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// New code and settings for one function
#[derive(Debug, Clone)]
pub struct FunctionDeployment {
    pub id: LogicalResourceId,
    pub function_name: String,
    pub package: PathBuf,
    pub handler: Option<String>,
    pub environment: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub function_arn: String,
    pub code_sha256: Option<String>,
}

/// The function rejects configuration updates while a code update is in flight
fn update_in_progress(error: &ProviderError) -> RetryClass {
    match error {
        ProviderError::AlreadyExists(_) => RetryClass::Retryable,
        other => other.retry_class(),
    }
}

/// Uploads new code, then updates handler and environment when given.
///
/// Refuses to touch a function whose identity tags do not match.
pub async fn deploy_function(
    ctx: &AwsContext,
    identity: &DeploymentIdentity,
    deployment: &FunctionDeployment,
    retry: &RetryConfig,
) -> Result<DeployOutcome, DeployError> {
    let name = deployment.function_name.as_str();
    let provider = FunctionProvider::from_context(ctx);
    let existing = provider
        .check_existence(name)
        .await?
        .ok_or_else(|| DeployError::NotProvisioned(name.to_string()))?;
    let observed = provider.get_tags(&existing.id).await?;
    tags::verify(&observed, identity, &deployment.id).map_err(|mismatch| DeployError::NotOwned {
        name: name.to_string(),
        mismatch,
    })?;

    let client = ctx.lambda_client();
    let zip = read_package(&deployment.package).await?;
    info!(function = %name, package = %deployment.package.display(), "Updating function code");
    let output = client
        .update_function_code()
        .function_name(name)
        .zip_file(zip)
        .send()
        .await
        .map_err(|e| classify(&e))?;

    if deployment.handler.is_some() || deployment.environment.is_some() {
        info!(function = %name, "Updating function configuration");
        with_retry(retry, update_in_progress, || async {
            let mut update = client.update_function_configuration().function_name(name);
            if let Some(handler) = &deployment.handler {
                update = update.handler(handler);
            }
            if let Some(variables) = &deployment.environment {
                update = update.environment(environment(variables));
            }
            update.send().await.map(|_| ()).map_err(|e| classify(&e))
        })
        .await
        .map_err(|e| e.into_inner())?;
    }

    Ok(DeployOutcome {
        function_arn: output
            .function_arn()
            .present()
            .unwrap_or(existing.id.as_str())
            .to_string(),
        code_sha256: output.code_sha256().present().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_retried_during_deploy() {
        assert_eq!(
            update_in_progress(&ProviderError::AlreadyExists("update in progress".into())),
            RetryClass::Retryable
        );
        assert_eq!(
            update_in_progress(&ProviderError::InvalidInput("bad handler".into())),
            RetryClass::Terminal
        );
    }
}
