//! Provisioning engine
//!
//! Reconciles every declared resource in dependency order, registers the
//! resulting attributes, then applies the wiring rules. The first failure
//! stops the run; wiring never runs on a partially reconciled deployment.

use crate::error::{CloudError, Result};
use crate::provider::{ProviderSet, WiringProvider};
use crate::reconcile::{ReconcileRequest, Reconciler};
use crate::registry::ResourceRegistry;
use crate::report::{ProvisionReport, ResourceOutcome};
use crate::reporter::{Reporter, StepContext, StepHandle};
use crate::resource::{DeclaredResource, LogicalResourceId, RegisteredResource};
use crate::retry::RetryConfig;
use crate::tags::DeploymentIdentity;
use crate::wiring::{WiringResolver, WiringRule, check_statement_ids};
use chrono::Utc;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};

/// Everything one provisioning run acts on
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub identity: DeploymentIdentity,
    pub resources: Vec<DeclaredResource>,
    pub wiring: Vec<WiringRule>,
}

impl DeploymentPlan {
    pub fn new(identity: DeploymentIdentity) -> Self {
        Self {
            identity,
            resources: Vec::new(),
            wiring: Vec::new(),
        }
    }

    pub fn resource(&self, id: &LogicalResourceId) -> Option<&DeclaredResource> {
        self.resources.iter().find(|resource| &resource.id == id)
    }

    /// Resources in dependency order.
    ///
    /// Stable: among resources whose dependencies are satisfied, declaration
    /// order wins.
    pub fn ordered(&self) -> Result<Vec<&DeclaredResource>> {
        let mut declared = HashSet::new();
        for resource in &self.resources {
            if !declared.insert(&resource.id) {
                return Err(CloudError::DuplicateDeclaration(resource.id.clone()));
            }
        }
        for resource in &self.resources {
            if let Some(dependency) = resource.depends_on.iter().find(|d| !declared.contains(d)) {
                return Err(CloudError::UnknownDependency {
                    id: resource.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let mut done: HashSet<&LogicalResourceId> = HashSet::new();
        let mut ordered = Vec::with_capacity(self.resources.len());
        while ordered.len() < self.resources.len() {
            let next = self.resources.iter().find(|resource| {
                !done.contains(&resource.id) && resource.depends_on.iter().all(|d| done.contains(d))
            });
            match next {
                Some(resource) => {
                    done.insert(&resource.id);
                    ordered.push(resource);
                }
                None => {
                    let stuck: Vec<_> = self
                        .resources
                        .iter()
                        .filter(|resource| !done.contains(&resource.id))
                        .map(|resource| resource.id.to_string())
                        .collect();
                    return Err(CloudError::CircularDependency(stuck.join(", ")));
                }
            }
        }
        Ok(ordered)
    }

    /// Static checks that need no cloud access: ordering, duplicates,
    /// colliding statement ids and wiring references to undeclared resources.
    pub fn validate(&self) -> Result<()> {
        self.ordered()?;
        check_statement_ids(&self.wiring)?;
        for (rule_index, rule) in self.wiring.iter().enumerate() {
            let missing = match rule {
                WiringRule::Grant { function, resource, .. } => [function, resource],
                WiringRule::InvokeFromBucket { bucket, function, .. } => [bucket, function],
                WiringRule::Route { api, function } => [api, function],
            }
            .into_iter()
            .find(|id| self.resource(id).is_none());

            if let Some(missing_id) = missing {
                return Err(CloudError::DanglingReference {
                    rule_index,
                    missing_id: missing_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Registry and report of a successful run
#[derive(Debug)]
pub struct Provisioned {
    pub registry: ResourceRegistry,
    pub report: ProvisionReport,
}

pub struct Provisioner<'a> {
    providers: &'a ProviderSet,
    wiring: &'a dyn WiringProvider,
    reporter: &'a dyn Reporter,
    retry: RetryConfig,
}

impl<'a> Provisioner<'a> {
    pub fn new(providers: &'a ProviderSet, wiring: &'a dyn WiringProvider, reporter: &'a dyn Reporter) -> Self {
        Self {
            providers,
            wiring,
            reporter,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn provision(&self, plan: &DeploymentPlan) -> Result<Provisioned> {
        let root = self.reporter.begin_step(
            None,
            &format!("provision {}", plan.identity),
            &StepContext::from([
                ("app".to_string(), plan.identity.app_name.clone()),
                ("environment".to_string(), plan.identity.environment.clone()),
                ("resources".to_string(), plan.resources.len().to_string()),
                ("wiring".to_string(), plan.wiring.len().to_string()),
            ]),
        );

        match self.run(plan, root).await {
            Ok(provisioned) => {
                let summary = provisioned.report.summary();
                self.reporter.step_succeeded(
                    root,
                    &StepContext::from([
                        ("summary".to_string(), summary.to_string()),
                        ("duration_ms".to_string(), provisioned.report.duration_ms.to_string()),
                    ]),
                );
                info!(identity = %plan.identity, %summary, "provisioning complete");
                Ok(provisioned)
            }
            Err(err) => {
                self.reporter.step_failed(root, &err);
                Err(err)
            }
        }
    }

    async fn run(&self, plan: &DeploymentPlan, root: StepHandle) -> Result<Provisioned> {
        let started = Instant::now();
        let mut report = ProvisionReport::new(Utc::now());
        let mut registry = ResourceRegistry::new();

        plan.validate()?;
        let ordered = plan.ordered()?;
        for resource in &ordered {
            self.providers.get(resource.kind)?;
        }

        let reconciler = Reconciler::new(&plan.identity, &self.retry, self.reporter);
        for resource in ordered {
            let provider = self.providers.get(resource.kind)?;
            let name = resource.physical_name(&plan.identity);
            let references: Vec<RegisteredResource> = resource
                .depends_on
                .iter()
                .filter_map(|dependency| registry.lookup(dependency).cloned())
                .collect();
            debug!(id = %resource.id, %name, references = references.len(), "reconciling");

            let outcome = reconciler
                .reconcile(
                    provider,
                    &ReconcileRequest {
                        id: &resource.id,
                        kind: resource.kind,
                        name: &name,
                        spec: &resource.spec,
                        references: &references,
                    },
                    Some(root),
                )
                .await?;

            registry.register_all(&resource.id, resource.kind, &outcome.attributes)?;
            report.resources.push(ResourceOutcome {
                id: resource.id.clone(),
                kind: resource.kind,
                name,
                disposition: outcome.disposition,
                attributes: outcome.attributes,
            });
        }

        if !plan.wiring.is_empty() {
            let resolver = WiringResolver::new(&registry, self.wiring, self.reporter, &self.retry);
            report.wiring = resolver.apply(&plan.wiring, Some(root)).await?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(Provisioned { registry, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    fn plan(resources: Vec<DeclaredResource>) -> DeploymentPlan {
        let mut plan = DeploymentPlan::new(DeploymentIdentity::new("app", "dev"));
        plan.resources = resources;
        plan
    }

    fn ids(ordered: Vec<&DeclaredResource>) -> Vec<&str> {
        ordered.into_iter().map(|r| r.id.short_name()).collect()
    }

    #[test]
    fn test_order_is_stable_and_respects_dependencies() {
        let role = DeclaredResource::new(ResourceKind::Role, "worker");
        let function = DeclaredResource::new(ResourceKind::Function, "worker").depends_on(role.id.clone());
        let bucket = DeclaredResource::new(ResourceKind::Bucket, "store");

        let plan = plan(vec![function, bucket, role]);
        let ordered = plan.ordered().unwrap();
        let kinds: Vec<_> = ordered.iter().map(|r| r.kind).collect();

        assert_eq!(kinds, vec![ResourceKind::Bucket, ResourceKind::Role, ResourceKind::Function]);
    }

    #[test]
    fn test_declaration_order_without_dependencies() {
        let plan = plan(vec![
            DeclaredResource::new(ResourceKind::Table, "b"),
            DeclaredResource::new(ResourceKind::Bucket, "a"),
            DeclaredResource::new(ResourceKind::LogGroup, "c"),
        ]);
        assert_eq!(ids(plan.ordered().unwrap()), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cycle_detected() {
        let a = LogicalResourceId::new(ResourceKind::Function, "a");
        let b = LogicalResourceId::new(ResourceKind::Role, "b");
        let plan = plan(vec![
            DeclaredResource::new(ResourceKind::Function, "a").depends_on(b),
            DeclaredResource::new(ResourceKind::Role, "b").depends_on(a),
        ]);

        assert!(matches!(plan.ordered(), Err(CloudError::CircularDependency(_))));
    }

    #[test]
    fn test_unknown_dependency() {
        let plan = plan(vec![
            DeclaredResource::new(ResourceKind::Function, "a")
                .depends_on(LogicalResourceId::new(ResourceKind::Role, "missing")),
        ]);

        assert!(matches!(plan.ordered(), Err(CloudError::UnknownDependency { .. })));
    }

    #[test]
    fn test_duplicate_declaration() {
        let plan = plan(vec![
            DeclaredResource::new(ResourceKind::Bucket, "a"),
            DeclaredResource::new(ResourceKind::Bucket, "a"),
        ]);

        assert!(matches!(plan.ordered(), Err(CloudError::DuplicateDeclaration(_))));
    }

    #[test]
    fn test_validate_dangling_wiring() {
        let mut plan = plan(vec![DeclaredResource::new(ResourceKind::Bucket, "store")]);
        plan.wiring.push(WiringRule::Grant {
            function: LogicalResourceId::new(ResourceKind::Function, "ghost"),
            resource: LogicalResourceId::new(ResourceKind::Bucket, "store"),
            operations: vec!["read".to_string()],
        });

        match plan.validate() {
            Err(CloudError::DanglingReference { rule_index, missing_id }) => {
                assert_eq!(rule_index, 0);
                assert_eq!(missing_id.short_name(), "ghost");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
