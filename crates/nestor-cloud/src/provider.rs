//! Provider adapter traits
//!
//! A `ResourceProvider` knows how to find, create and read the tags of one
//! resource kind. A `WiringProvider` performs the cross-resource calls that
//! connect reconciled resources. The engine only ever talks to these traits.

use crate::error::{CloudError, ProviderError, Result};
use crate::resource::{Attributes, LogicalResourceId, RegisteredResource, ResourceKind, ResourceSpec};
use crate::retry::RetryClass;
use crate::tags::TagMap;
use crate::wiring::{AccessGrant, InvokePermission, NotificationTarget};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A resource found by an existence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingResource {
    /// Provider-native identifier used to read tags (ARN, bucket name, API id...)
    pub id: String,
    pub attributes: Attributes,
}

/// Everything a provider needs to create one resource
#[derive(Debug)]
pub struct CreateRequest<'a> {
    pub id: &'a LogicalResourceId,
    pub name: &'a str,
    pub tags: &'a TagMap,
    pub spec: &'a ResourceSpec,
    /// Already reconciled resources this one depends on
    pub references: &'a [RegisteredResource],
}

impl CreateRequest<'_> {
    pub fn reference(&self, kind: ResourceKind) -> Option<&RegisteredResource> {
        self.references.iter().find(|resource| resource.kind == kind)
    }
}

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Looks up a resource by physical name. `Ok(None)` means it does not exist.
    async fn check_existence(&self, name: &str) -> std::result::Result<Option<ExistingResource>, ProviderError>;

    /// Creates the resource with the given identity tags and returns its attributes
    async fn create(&self, request: &CreateRequest<'_>) -> std::result::Result<Attributes, ProviderError>;

    async fn get_tags(&self, id: &str) -> std::result::Result<TagMap, ProviderError>;

    /// Classifies a failure of `create`
    fn retry_class(&self, error: &ProviderError) -> RetryClass {
        error.retry_class()
    }
}

#[async_trait]
pub trait WiringProvider: Send + Sync {
    /// Allows the function's execution role to perform operations on a resource
    async fn grant_access(&self, grant: &AccessGrant) -> std::result::Result<(), ProviderError>;

    /// Removes a statement from the function's resource policy; absent statements are not an error
    async fn remove_invoke_permission(
        &self,
        function: &RegisteredResource,
        statement_id: &str,
    ) -> std::result::Result<(), ProviderError>;

    async fn add_invoke_permission(&self, permission: &InvokePermission) -> std::result::Result<(), ProviderError>;

    /// Replaces the bucket's function notifications with `targets`
    async fn put_bucket_notifications(
        &self,
        bucket: &RegisteredResource,
        targets: &[NotificationTarget],
    ) -> std::result::Result<(), ProviderError>;

    /// Points the API's default route at the function
    async fn attach_route(
        &self,
        api: &RegisteredResource,
        function: &RegisteredResource,
    ) -> std::result::Result<(), ProviderError>;

    fn retry_class(&self, error: &ProviderError) -> RetryClass {
        error.retry_class()
    }
}

/// Resource kind to adapter table
#[derive(Default, Clone)]
pub struct ProviderSet {
    providers: HashMap<ResourceKind, Arc<dyn ResourceProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Result<&dyn ResourceProvider> {
        self.providers
            .get(&kind)
            .map(|provider| provider.as_ref())
            .ok_or(CloudError::ProviderNotRegistered(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.providers.keys().copied()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.providers.keys().collect();
        kinds.sort();
        f.debug_struct("ProviderSet").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullProvider(ResourceKind);

    #[async_trait]
    impl ResourceProvider for NullProvider {
        fn kind(&self) -> ResourceKind {
            self.0
        }

        async fn check_existence(&self, _name: &str) -> std::result::Result<Option<ExistingResource>, ProviderError> {
            Ok(None)
        }

        async fn create(&self, _request: &CreateRequest<'_>) -> std::result::Result<Attributes, ProviderError> {
            Ok(Attributes::new())
        }

        async fn get_tags(&self, _id: &str) -> std::result::Result<TagMap, ProviderError> {
            Ok(TagMap::new())
        }
    }

    #[test]
    fn test_provider_set_lookup() {
        let set = ProviderSet::new().with(Arc::new(NullProvider(ResourceKind::Bucket)));

        assert_eq!(set.get(ResourceKind::Bucket).unwrap().kind(), ResourceKind::Bucket);
        assert!(matches!(
            set.get(ResourceKind::Table),
            Err(CloudError::ProviderNotRegistered(ResourceKind::Table))
        ));
    }

    #[test]
    fn test_default_retry_class_follows_error() {
        let provider = NullProvider(ResourceKind::Function);
        assert_eq!(
            provider.retry_class(&ProviderError::Propagation("role".into())),
            RetryClass::Retryable
        );
        assert_eq!(
            provider.retry_class(&ProviderError::AccessDenied("nope".into())),
            RetryClass::Terminal
        );
    }
}
