//! Shared AWS configuration context
//!
//! Loads the SDK configuration once per region and hands out service
//! clients. User pools live in a separate identity region.

use crate::error::{AwsError, classify};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;
use tracing::info;

/// Where to connect
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    /// Named profile from the shared config files
    pub profile: Option<String>,
    pub region: String,
    /// Region for Cognito user pools, defaults to `region`
    pub identity_region: Option<String>,
}

#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    identity_config: Arc<SdkConfig>,
    region: String,
    account_id: String,
}

async fn load(profile: Option<&str>, region: &str) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

impl AwsContext {
    /// Loads credentials and resolves the account id with STS GetCallerIdentity.
    ///
    /// Fails early when credentials are missing or invalid.
    pub async fn load(settings: &AwsSettings) -> Result<Self, AwsError> {
        let profile = settings.profile.as_deref();
        let config = load(profile, &settings.region).await;
        let identity_config = match settings.identity_region.as_deref() {
            Some(identity_region) if identity_region != settings.region => load(profile, identity_region).await,
            _ => config.clone(),
        };

        let account_id = caller_account(&config).await?;
        info!(account_id = %account_id, region = %settings.region, "AWS account resolved");

        Ok(Self {
            config: Arc::new(config),
            identity_config: Arc::new(identity_config),
            region: settings.region.clone(),
            account_id,
        })
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(self.sdk_config())
    }

    pub fn iam_client(&self) -> aws_sdk_iam::Client {
        aws_sdk_iam::Client::new(self.sdk_config())
    }

    pub fn lambda_client(&self) -> aws_sdk_lambda::Client {
        aws_sdk_lambda::Client::new(self.sdk_config())
    }

    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(self.sdk_config())
    }

    pub fn eventbridge_client(&self) -> aws_sdk_eventbridge::Client {
        aws_sdk_eventbridge::Client::new(self.sdk_config())
    }

    pub fn logs_client(&self) -> aws_sdk_cloudwatchlogs::Client {
        aws_sdk_cloudwatchlogs::Client::new(self.sdk_config())
    }

    pub fn apigateway_client(&self) -> aws_sdk_apigatewayv2::Client {
        aws_sdk_apigatewayv2::Client::new(self.sdk_config())
    }

    /// Cognito client bound to the identity region
    pub fn cognito_client(&self) -> aws_sdk_cognitoidentityprovider::Client {
        aws_sdk_cognitoidentityprovider::Client::new(&self.identity_config)
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Account id of the loaded credentials
async fn caller_account(config: &SdkConfig) -> Result<String, AwsError> {
    let sts = aws_sdk_sts::Client::new(config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| AwsError::Account(classify(&e).to_string()))?;

    identity
        .account()
        .map(str::to_string)
        .ok_or_else(|| AwsError::Account("no account id returned from STS GetCallerIdentity".to_string()))
}
