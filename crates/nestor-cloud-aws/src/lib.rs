//! AWS provider for Nestor
//!
//! One `ResourceProvider` per resource kind plus a `WiringProvider` that
//! performs IAM grants, Lambda invoke permissions, S3 notifications and
//! HTTP API routes.

pub mod apigateway;
pub mod cognito;
pub mod context;
pub mod deploy;
pub mod dynamodb;
pub mod error;
pub mod eventbridge;
pub mod iam;
pub mod lambda;
pub mod logs;
pub mod policy;
pub mod s3;
mod sdk;
pub mod wiring;

pub use context::{AwsContext, AwsSettings};
pub use deploy::{DeployError, DeployOutcome, FunctionDeployment, deploy_function};
pub use error::AwsError;
pub use wiring::AwsWiring;

use nestor_cloud::ProviderSet;
use std::sync::Arc;

/// Adapters for every resource kind, sharing one context
pub fn provider_set(ctx: &AwsContext) -> ProviderSet {
    ProviderSet::new()
        .with(Arc::new(cognito::UserPoolProvider::from_context(ctx)))
        .with(Arc::new(dynamodb::TableProvider::from_context(ctx)))
        .with(Arc::new(eventbridge::EventBusProvider::from_context(ctx)))
        .with(Arc::new(s3::BucketProvider::from_context(ctx)))
        .with(Arc::new(apigateway::HttpApiProvider::from_context(ctx)))
        .with(Arc::new(logs::LogGroupProvider::from_context(ctx)))
        .with(Arc::new(lambda::FunctionProvider::from_context(ctx)))
        .with(Arc::new(iam::RoleProvider::from_context(ctx)))
}
