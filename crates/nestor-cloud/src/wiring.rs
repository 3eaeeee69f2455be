//! Wiring between reconciled resources
//!
//! Rules are resolved against the registry before anything is touched: a
//! single unknown reference fails the whole step. Rules are then applied in
//! declaration order. Bucket notifications are collected per bucket and
//! written once at the end, since each write replaces the bucket's whole
//! notification configuration.

use crate::error::{CloudError, ProviderError, Result};
use crate::provider::WiringProvider;
use crate::registry::ResourceRegistry;
use crate::reporter::{Reporter, StepContext, StepHandle};
use crate::resource::{AttributeName, LogicalResourceId, RegisteredResource, ResourceKind};
use crate::retry::{RetryConfig, RetryError, with_retry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tracing::debug;

/// A declared relationship between two resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringRule {
    /// Lets a function perform `operations` on a bucket or table
    Grant {
        function: LogicalResourceId,
        resource: LogicalResourceId,
        operations: Vec<String>,
    },
    /// Invokes a function when objects are created in a bucket
    InvokeFromBucket {
        bucket: LogicalResourceId,
        function: LogicalResourceId,
        prefix: Option<String>,
        suffix: Option<String>,
    },
    /// Routes every request of an HTTP API to a function
    Route {
        api: LogicalResourceId,
        function: LogicalResourceId,
    },
}

impl WiringRule {
    pub fn relation(&self) -> &'static str {
        match self {
            WiringRule::Grant { .. } => "grant",
            WiringRule::InvokeFromBucket { .. } => "invoke-from-bucket",
            WiringRule::Route { .. } => "route",
        }
    }

    /// (source, target) pair the statement id is derived from
    fn endpoints(&self) -> (&LogicalResourceId, &LogicalResourceId) {
        match self {
            WiringRule::Grant { function, resource, .. } => (resource, function),
            WiringRule::InvokeFromBucket { bucket, function, .. } => (bucket, function),
            WiringRule::Route { api, function } => (api, function),
        }
    }

    pub fn statement_id(&self) -> String {
        let (source, target) = self.endpoints();
        statement_id(source, target)
    }

    pub fn scope(&self) -> StatementScope {
        match self {
            WiringRule::Grant { .. } => StatementScope::RolePolicy,
            WiringRule::InvokeFromBucket { .. } | WiringRule::Route { .. } => StatementScope::ResourcePolicy,
        }
    }
}

/// Where a rule's statement id is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementScope {
    /// Inline policy on the function's execution role, named by the statement id
    RolePolicy,
    /// Statement in the function's resource policy
    ResourcePolicy,
}

/// Rejects two rules that would write the same resource-policy statement of
/// one function. Grants sharing a role policy name are merged instead.
pub fn check_statement_ids(rules: &[WiringRule]) -> Result<()> {
    let mut seen: HashMap<(&LogicalResourceId, String), usize> = HashMap::new();
    for (rule_index, rule) in rules.iter().enumerate() {
        if rule.scope() != StatementScope::ResourcePolicy {
            continue;
        }
        let (_, function) = rule.endpoints();
        let statement_id = rule.statement_id();
        if let Some(&first) = seen.get(&(function, statement_id.clone())) {
            return Err(CloudError::DuplicateStatementId {
                statement_id,
                first,
                second: rule_index,
            });
        }
        seen.insert((function, statement_id), rule_index);
    }
    Ok(())
}

/// `sid-<source>-<target>`, built from the last segment of each logical id
pub fn statement_id(source: &LogicalResourceId, target: &LogicalResourceId) -> String {
    format!("sid-{}-{}", source.short_name(), target.short_name())
}

/// Request to let a function's execution role access resources.
///
/// Holds every grant of the plan sharing this function and statement id, so
/// each write replaces the role policy with the complete set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub statement_id: String,
    pub function: RegisteredResource,
    pub targets: Vec<GrantTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantTarget {
    pub resource: RegisteredResource,
    pub operations: Vec<String>,
}

/// Request to let a service invoke a function on behalf of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokePermission {
    pub statement_id: String,
    pub function: RegisteredResource,
    /// The bucket or API that invokes the function
    pub source: RegisteredResource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub statement_id: String,
    pub function: RegisteredResource,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringOutcome {
    pub rule_index: usize,
    pub relation: &'static str,
    pub statement_id: String,
}

#[derive(Debug)]
enum ResolvedRule {
    Grant(AccessGrant),
    InvokeFromBucket {
        permission: InvokePermission,
        target: NotificationTarget,
    },
    Route {
        api: RegisteredResource,
        permission: InvokePermission,
    },
}

pub struct WiringResolver<'a> {
    registry: &'a ResourceRegistry,
    provider: &'a dyn WiringProvider,
    reporter: &'a dyn Reporter,
    retry: &'a RetryConfig,
}

impl<'a> WiringResolver<'a> {
    pub fn new(
        registry: &'a ResourceRegistry,
        provider: &'a dyn WiringProvider,
        reporter: &'a dyn Reporter,
        retry: &'a RetryConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            reporter,
            retry,
        }
    }

    /// Checks every rule against the registry without touching any provider
    pub fn validate(&self, rules: &[WiringRule]) -> Result<()> {
        self.resolve_all(rules).map(|_| ())
    }

    /// Resolves every rule, then applies them in order. Fails fast.
    pub async fn apply(&self, rules: &[WiringRule], parent: Option<StepHandle>) -> Result<Vec<WiringOutcome>> {
        let resolved = self.resolve_all(rules)?;
        let mut outcomes = Vec::with_capacity(resolved.len());
        // bucket id -> (bucket, targets, index of the last contributing rule)
        let mut notifications: BTreeMap<LogicalResourceId, (RegisteredResource, Vec<NotificationTarget>, usize)> =
            BTreeMap::new();

        for (rule_index, (rule, resolved)) in rules.iter().zip(resolved).enumerate() {
            let relation = rule.relation();
            let (source, target) = rule.endpoints();
            let step = self.reporter.begin_step(
                parent,
                &format!("{relation} {} -> {}", source.short_name(), target.short_name()),
                &StepContext::from([
                    ("rule".to_string(), rule_index.to_string()),
                    ("source".to_string(), source.to_string()),
                    ("target".to_string(), target.to_string()),
                ]),
            );

            let statement_id = rule.statement_id();
            let applied = match resolved {
                ResolvedRule::Grant(grant) => {
                    self.call(rule_index, relation, || self.provider.grant_access(&grant))
                        .await
                }
                ResolvedRule::InvokeFromBucket { permission, target } => {
                    let applied = self.replace_permission(rule_index, relation, &permission).await;
                    if applied.is_ok() {
                        let entry = notifications
                            .entry(permission.source.id.clone())
                            .or_insert_with(|| (permission.source.clone(), Vec::new(), rule_index));
                        entry.1.push(target);
                        entry.2 = rule_index;
                    }
                    applied
                }
                ResolvedRule::Route { api, permission } => {
                    match self.replace_permission(rule_index, relation, &permission).await {
                        Ok(()) => {
                            self.call(rule_index, relation, || {
                                self.provider.attach_route(&api, &permission.function)
                            })
                            .await
                        }
                        Err(err) => Err(err),
                    }
                }
            };

            match applied {
                Ok(()) => {
                    self.reporter.step_succeeded(
                        step,
                        &StepContext::from([("statement_id".to_string(), statement_id.clone())]),
                    );
                    outcomes.push(WiringOutcome {
                        rule_index,
                        relation,
                        statement_id,
                    });
                }
                Err(err) => {
                    self.reporter.step_failed(step, &err);
                    return Err(err);
                }
            }
        }

        for (bucket, targets, rule_index) in notifications.into_values() {
            let step = self.reporter.begin_step(
                parent,
                &format!("notifications {}", bucket.id.short_name()),
                &StepContext::from([
                    ("bucket".to_string(), bucket.id.to_string()),
                    ("targets".to_string(), targets.len().to_string()),
                ]),
            );
            match self
                .call(rule_index, "bucket-notification", || {
                    self.provider.put_bucket_notifications(&bucket, &targets)
                })
                .await
            {
                Ok(()) => self.reporter.step_succeeded(step, &StepContext::new()),
                Err(err) => {
                    self.reporter.step_failed(step, &err);
                    return Err(err);
                }
            }
        }

        Ok(outcomes)
    }

    async fn replace_permission(
        &self,
        rule_index: usize,
        relation: &'static str,
        permission: &InvokePermission,
    ) -> Result<()> {
        self.call(rule_index, relation, || {
            self.provider
                .remove_invoke_permission(&permission.function, &permission.statement_id)
        })
        .await?;
        self.call(rule_index, relation, || self.provider.add_invoke_permission(permission))
            .await
    }

    async fn call<Op, Fut>(&self, rule_index: usize, relation: &'static str, operation: Op) -> Result<()>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<(), ProviderError>>,
    {
        with_retry(self.retry, |err| self.provider.retry_class(err), operation)
            .await
            .map_err(|err| match err {
                RetryError::Terminal(source) => CloudError::Wiring {
                    rule_index,
                    relation,
                    source,
                },
                RetryError::Exhausted { attempts, last } => CloudError::WiringRetryExhausted {
                    rule_index,
                    relation,
                    attempts,
                    last,
                },
            })
    }

    fn resolve_all(&self, rules: &[WiringRule]) -> Result<Vec<ResolvedRule>> {
        check_statement_ids(rules)?;
        let mut resolved = Vec::with_capacity(rules.len());

        for (rule_index, rule) in rules.iter().enumerate() {
            let statement_id = rule.statement_id();
            debug!(rule_index, relation = rule.relation(), %statement_id, "resolving wiring rule");
            resolved.push(self.resolve(rule_index, rule, statement_id)?);
        }

        // (function, statement id) -> every grant target written under that policy name
        let mut role_policies: HashMap<(LogicalResourceId, String), Vec<GrantTarget>> = HashMap::new();
        for rule in &resolved {
            if let ResolvedRule::Grant(grant) = rule {
                role_policies
                    .entry((grant.function.id.clone(), grant.statement_id.clone()))
                    .or_default()
                    .extend(grant.targets.iter().cloned());
            }
        }
        for rule in &mut resolved {
            if let ResolvedRule::Grant(grant) = rule
                && let Some(targets) = role_policies.get(&(grant.function.id.clone(), grant.statement_id.clone()))
            {
                grant.targets = targets.clone();
            }
        }

        Ok(resolved)
    }

    fn resolve(&self, rule_index: usize, rule: &WiringRule, statement_id: String) -> Result<ResolvedRule> {
        match rule {
            WiringRule::Grant {
                function,
                resource,
                operations,
            } => {
                let function = self.expect(rule_index, function, &[ResourceKind::Function], "a function")?;
                let resource = self.expect(
                    rule_index,
                    resource,
                    &[ResourceKind::Bucket, ResourceKind::Table],
                    "a bucket or table",
                )?;
                function.require(AttributeName::Name)?;
                resource.require(AttributeName::Arn)?;
                Ok(ResolvedRule::Grant(AccessGrant {
                    statement_id,
                    function: function.clone(),
                    targets: vec![GrantTarget {
                        resource: resource.clone(),
                        operations: operations.clone(),
                    }],
                }))
            }
            WiringRule::InvokeFromBucket {
                bucket,
                function,
                prefix,
                suffix,
            } => {
                let bucket = self.expect(rule_index, bucket, &[ResourceKind::Bucket], "a bucket")?;
                let function = self.expect(rule_index, function, &[ResourceKind::Function], "a function")?;
                bucket.require(AttributeName::Arn)?;
                function.require(AttributeName::Arn)?;
                Ok(ResolvedRule::InvokeFromBucket {
                    permission: InvokePermission {
                        statement_id: statement_id.clone(),
                        function: function.clone(),
                        source: bucket.clone(),
                    },
                    target: NotificationTarget {
                        statement_id,
                        function: function.clone(),
                        prefix: prefix.clone(),
                        suffix: suffix.clone(),
                    },
                })
            }
            WiringRule::Route { api, function } => {
                let api = self.expect(rule_index, api, &[ResourceKind::HttpApi], "an HTTP API")?;
                let function = self.expect(rule_index, function, &[ResourceKind::Function], "a function")?;
                api.require(AttributeName::Id)?;
                function.require(AttributeName::Arn)?;
                Ok(ResolvedRule::Route {
                    api: api.clone(),
                    permission: InvokePermission {
                        statement_id,
                        function: function.clone(),
                        source: api.clone(),
                    },
                })
            }
        }
    }

    fn expect(
        &self,
        rule_index: usize,
        id: &LogicalResourceId,
        kinds: &[ResourceKind],
        expected: &'static str,
    ) -> Result<&'a RegisteredResource> {
        let resource = self
            .registry
            .lookup(id)
            .ok_or_else(|| CloudError::DanglingReference {
                rule_index,
                missing_id: id.clone(),
            })?;
        if !kinds.contains(&resource.kind) {
            return Err(CloudError::WiringKindMismatch {
                rule_index,
                id: id.clone(),
                expected,
                actual: resource.kind,
            });
        }
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_id_from_short_names() {
        let rule = WiringRule::Grant {
            function: LogicalResourceId::new(ResourceKind::Function, "worker"),
            resource: LogicalResourceId::new(ResourceKind::Bucket, "store"),
            operations: vec!["read".to_string()],
        };
        assert_eq!(rule.statement_id(), "sid-store-worker");
        assert_eq!(rule.relation(), "grant");

        let route = WiringRule::Route {
            api: LogicalResourceId::new(ResourceKind::HttpApi, "public"),
            function: LogicalResourceId::new(ResourceKind::Function, "handler"),
        };
        assert_eq!(route.statement_id(), "sid-public-handler");
    }

    #[test]
    fn test_statement_ids_are_scoped() {
        let worker = LogicalResourceId::new(ResourceKind::Function, "worker");
        let upload = LogicalResourceId::new(ResourceKind::Bucket, "upload");
        let grant = WiringRule::Grant {
            function: worker.clone(),
            resource: upload.clone(),
            operations: vec!["read".to_string()],
        };
        let trigger = WiringRule::InvokeFromBucket {
            bucket: upload,
            function: worker.clone(),
            prefix: None,
            suffix: None,
        };
        assert_eq!(grant.statement_id(), trigger.statement_id());
        check_statement_ids(&[grant, trigger.clone()]).unwrap();

        let route = WiringRule::Route {
            api: LogicalResourceId::new(ResourceKind::HttpApi, "upload"),
            function: worker,
        };
        match check_statement_ids(&[trigger, route]).unwrap_err() {
            CloudError::DuplicateStatementId { first, second, .. } => assert_eq!((first, second), (0, 1)),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
