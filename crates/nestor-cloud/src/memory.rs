//! In-memory cloud
//!
//! A provider backend that keeps resources in a map. Used for dry runs and
//! tests: it counts every call, can be seeded with pre-existing resources
//! and can be told to fail the next call of a given operation.

use crate::error::ProviderError;
use crate::provider::{CreateRequest, ExistingResource, ProviderSet, ResourceProvider, WiringProvider};
use crate::resource::{AttributeName, Attributes, RegisteredResource, ResourceKind};
use crate::tags::TagMap;
use crate::wiring::{AccessGrant, InvokePermission, NotificationTarget};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CheckExistence,
    Create,
    GetTags,
    GrantAccess,
    RemoveInvokePermission,
    AddInvokePermission,
    PutBucketNotifications,
    AttachRoute,
}

/// Key for per-call bookkeeping; wiring calls have no kind
type CallKey = (Option<ResourceKind>, Operation);

#[derive(Debug, Clone)]
struct StoredResource {
    kind: ResourceKind,
    name: String,
    id: String,
    attributes: Attributes,
    tags: TagMap,
}

#[derive(Debug, Default)]
struct CloudState {
    resources: Vec<StoredResource>,
    calls: HashMap<CallKey, usize>,
    failures: HashMap<CallKey, VecDeque<ProviderError>>,
    /// Resources that appear right before the next create of that name
    races: HashMap<(ResourceKind, String), TagMap>,
    grants: Vec<AccessGrant>,
    permissions: Vec<InvokePermission>,
    removed_permissions: Vec<(String, String)>,
    notifications: BTreeMap<String, Vec<NotificationTarget>>,
    routes: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct InMemoryCloud {
    state: Mutex<CloudState>,
}

impl InMemoryCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Providers for every resource kind, all backed by this cloud
    pub fn provider_set(self: &Arc<Self>) -> ProviderSet {
        let mut set = ProviderSet::new();
        for kind in ResourceKind::ALL {
            set.register(Arc::new(InMemoryProvider {
                kind,
                cloud: Arc::clone(self),
            }));
        }
        set
    }

    /// Adds a resource as if it had been created outside this run
    pub fn seed(&self, kind: ResourceKind, name: &str, tags: TagMap) {
        let resource = stored(kind, name, tags);
        self.lock().resources.push(resource);
    }

    /// Queues an error for the next call of `operation` on `kind`
    pub fn fail_next(&self, kind: ResourceKind, operation: Operation, error: ProviderError) {
        self.lock()
            .failures
            .entry((Some(kind), operation))
            .or_default()
            .push_back(error);
    }

    /// Queues an error for the next wiring call of `operation`
    pub fn fail_next_wiring(&self, operation: Operation, error: ProviderError) {
        self.lock()
            .failures
            .entry((None, operation))
            .or_default()
            .push_back(error);
    }

    /// Makes the next create of `name` lose a race against another writer
    /// that creates the same resource with `tags`.
    pub fn race_on_create(&self, kind: ResourceKind, name: &str, tags: TagMap) {
        self.lock().races.insert((kind, name.to_string()), tags);
    }

    pub fn calls(&self, kind: ResourceKind, operation: Operation) -> usize {
        self.lock()
            .calls
            .get(&(Some(kind), operation))
            .copied()
            .unwrap_or(0)
    }

    pub fn wiring_calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&(None, operation)).copied().unwrap_or(0)
    }

    /// Total number of mutating calls, resource and wiring alike
    pub fn mutations(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|((_, operation), _)| {
                !matches!(operation, Operation::CheckExistence | Operation::GetTags)
            })
            .map(|(_, count)| count)
            .sum()
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    pub fn tags_of(&self, kind: ResourceKind, name: &str) -> Option<TagMap> {
        self.lock()
            .resources
            .iter()
            .find(|r| r.kind == kind && r.name == name)
            .map(|r| r.tags.clone())
    }

    pub fn grants(&self) -> Vec<AccessGrant> {
        self.lock().grants.clone()
    }

    pub fn permissions(&self) -> Vec<InvokePermission> {
        self.lock().permissions.clone()
    }

    /// (function name, statement id) pairs passed to remove_invoke_permission
    pub fn removed_permissions(&self) -> Vec<(String, String)> {
        self.lock().removed_permissions.clone()
    }

    /// Notification targets by bucket name
    pub fn notifications(&self) -> BTreeMap<String, Vec<NotificationTarget>> {
        self.lock().notifications.clone()
    }

    /// (api id, function arn) pairs
    pub fn routes(&self) -> Vec<(String, String)> {
        self.lock().routes.clone()
    }

    /// Counts the call and pops a queued failure, if any
    fn record(&self, kind: Option<ResourceKind>, operation: Operation) -> Result<(), ProviderError> {
        let mut state = self.lock();
        *state.calls.entry((kind, operation)).or_default() += 1;
        match state
            .failures
            .get_mut(&(kind, operation))
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn stored(kind: ResourceKind, name: &str, tags: TagMap) -> StoredResource {
    let arn = format!("arn:memory:{}:::{}", kind.config_key(), name);
    let mut attributes = Attributes::new();
    for attribute in kind.attributes() {
        let value = match attribute {
            AttributeName::Arn => arn.clone(),
            AttributeName::Id => format!("{}-id", name),
            AttributeName::Name => name.to_string(),
            AttributeName::Endpoint => format!("https://{name}.memory.local"),
        };
        attributes.insert(*attribute, value);
    }
    StoredResource {
        kind,
        name: name.to_string(),
        id: arn,
        attributes,
        tags,
    }
}

fn name_of(resource: &RegisteredResource) -> String {
    resource
        .attribute(AttributeName::Name)
        .or_else(|| resource.attribute(AttributeName::Id))
        .unwrap_or(resource.id.as_str())
        .to_string()
}

/// One kind's view of an `InMemoryCloud`
pub struct InMemoryProvider {
    kind: ResourceKind,
    cloud: Arc<InMemoryCloud>,
}

impl InMemoryProvider {
    pub fn new(kind: ResourceKind, cloud: Arc<InMemoryCloud>) -> Self {
        Self { kind, cloud }
    }
}

#[async_trait]
impl ResourceProvider for InMemoryProvider {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn check_existence(&self, name: &str) -> Result<Option<ExistingResource>, ProviderError> {
        self.cloud.record(Some(self.kind), Operation::CheckExistence)?;
        let state = self.cloud.lock();
        Ok(state
            .resources
            .iter()
            .find(|r| r.kind == self.kind && r.name == name)
            .map(|r| ExistingResource {
                id: r.id.clone(),
                attributes: r.attributes.clone(),
            }))
    }

    async fn create(&self, request: &CreateRequest<'_>) -> Result<Attributes, ProviderError> {
        self.cloud.record(Some(self.kind), Operation::Create)?;
        let mut state = self.cloud.lock();

        if let Some(tags) = state.races.remove(&(self.kind, request.name.to_string())) {
            debug!(name = request.name, "simulating concurrent create");
            state.resources.push(stored(self.kind, request.name, tags));
        }
        if state
            .resources
            .iter()
            .any(|r| r.kind == self.kind && r.name == request.name)
        {
            return Err(ProviderError::AlreadyExists(request.name.to_string()));
        }

        let resource = stored(self.kind, request.name, request.tags.clone());
        let attributes = resource.attributes.clone();
        state.resources.push(resource);
        Ok(attributes)
    }

    async fn get_tags(&self, id: &str) -> Result<TagMap, ProviderError> {
        self.cloud.record(Some(self.kind), Operation::GetTags)?;
        let state = self.cloud.lock();
        state
            .resources
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.tags.clone())
            .ok_or_else(|| ProviderError::api("NotFound", format!("no resource with id {id}")))
    }
}

#[async_trait]
impl WiringProvider for InMemoryCloud {
    async fn grant_access(&self, grant: &AccessGrant) -> Result<(), ProviderError> {
        self.record(None, Operation::GrantAccess)?;
        let mut state = self.lock();
        state
            .grants
            .retain(|g| !(g.function.id == grant.function.id && g.statement_id == grant.statement_id));
        state.grants.push(grant.clone());
        Ok(())
    }

    async fn remove_invoke_permission(
        &self,
        function: &RegisteredResource,
        statement_id: &str,
    ) -> Result<(), ProviderError> {
        self.record(None, Operation::RemoveInvokePermission)?;
        let mut state = self.lock();
        state
            .removed_permissions
            .push((name_of(function), statement_id.to_string()));
        state
            .permissions
            .retain(|p| !(p.function.id == function.id && p.statement_id == statement_id));
        Ok(())
    }

    async fn add_invoke_permission(&self, permission: &InvokePermission) -> Result<(), ProviderError> {
        self.record(None, Operation::AddInvokePermission)?;
        let mut state = self.lock();
        if state
            .permissions
            .iter()
            .any(|p| p.function.id == permission.function.id && p.statement_id == permission.statement_id)
        {
            return Err(ProviderError::AlreadyExists(permission.statement_id.clone()));
        }
        state.permissions.push(permission.clone());
        Ok(())
    }

    async fn put_bucket_notifications(
        &self,
        bucket: &RegisteredResource,
        targets: &[NotificationTarget],
    ) -> Result<(), ProviderError> {
        self.record(None, Operation::PutBucketNotifications)?;
        self.lock()
            .notifications
            .insert(name_of(bucket), targets.to_vec());
        Ok(())
    }

    async fn attach_route(
        &self,
        api: &RegisteredResource,
        function: &RegisteredResource,
    ) -> Result<(), ProviderError> {
        self.record(None, Operation::AttachRoute)?;
        let api_id = api.attribute(AttributeName::Id).unwrap_or_default().to_string();
        let function_arn = function.attribute(AttributeName::Arn).unwrap_or_default().to_string();
        let mut state = self.lock();
        state.routes.retain(|(id, _)| id != &api_id);
        state.routes.push((api_id, function_arn));
        Ok(())
    }
}
