//! Check-or-create reconciliation of a single resource
//!
//! ```text
//! NotChecked -> Checking -> Exists -> (tags verified) -> Reconciled
//!                        -> Absent -> Creating -> Reconciled
//!                                  -> (already exists, first time) -> Checking
//! ```
//!
//! An existing resource is only adopted when its identity tags match. Any
//! mismatch aborts with `ForeignResourceConflict`; the reconciler never
//! creates, renames or modifies a resource it cannot prove it owns.

use crate::error::{CloudError, ProviderError, Result};
use crate::provider::{CreateRequest, ExistingResource, ResourceProvider};
use crate::reporter::{Reporter, StepContext, StepHandle};
use crate::resource::{AttributeName, Attributes, LogicalResourceId, RegisteredResource, ResourceKind, ResourceSpec};
use crate::retry::{RetryConfig, RetryError, with_retry};
use crate::tags::{self, DeploymentIdentity};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Created,
    /// Found with matching tags
    Existing,
    /// Appeared between the existence check and the create call, tags matched
    ExistingAfterRace,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Created => write!(f, "created"),
            Disposition::Existing => write!(f, "already exists"),
            Disposition::ExistingAfterRace => write!(f, "already exists (created concurrently)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub disposition: Disposition,
    pub attributes: Attributes,
}

#[derive(Debug)]
enum ReconcileState {
    NotChecked,
    Checking,
    Exists(ExistingResource),
    Absent,
    Reconciled(ReconcileOutcome),
}

/// One resource to reconcile
#[derive(Debug)]
pub struct ReconcileRequest<'a> {
    pub id: &'a LogicalResourceId,
    pub kind: ResourceKind,
    pub name: &'a str,
    pub spec: &'a ResourceSpec,
    pub references: &'a [RegisteredResource],
}

pub struct Reconciler<'a> {
    identity: &'a DeploymentIdentity,
    retry: &'a RetryConfig,
    reporter: &'a dyn Reporter,
}

impl<'a> Reconciler<'a> {
    pub fn new(identity: &'a DeploymentIdentity, retry: &'a RetryConfig, reporter: &'a dyn Reporter) -> Self {
        Self {
            identity,
            retry,
            reporter,
        }
    }

    /// Ensures the resource exists and belongs to this deployment.
    ///
    /// Reports a step under `parent` with the outcome or the failure.
    pub async fn reconcile(
        &self,
        provider: &dyn ResourceProvider,
        request: &ReconcileRequest<'_>,
        parent: Option<StepHandle>,
    ) -> Result<ReconcileOutcome> {
        let context = StepContext::from([
            ("id".to_string(), request.id.to_string()),
            ("kind".to_string(), request.kind.to_string()),
            ("name".to_string(), request.name.to_string()),
        ]);
        let step = self.reporter.begin_step(
            parent,
            &format!("{} {}", request.kind, request.name),
            &context,
        );

        match self.run(provider, request, step).await {
            Ok(outcome) => {
                let mut result: StepContext = outcome
                    .attributes
                    .iter()
                    .map(|(attribute, value)| (attribute.to_string(), value.clone()))
                    .collect();
                result.insert("outcome".to_string(), outcome.disposition.to_string());
                self.reporter.step_succeeded(step, &result);
                Ok(outcome)
            }
            Err(err) => {
                self.reporter.step_failed(step, &err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        provider: &dyn ResourceProvider,
        request: &ReconcileRequest<'_>,
        step: StepHandle,
    ) -> Result<ReconcileOutcome> {
        let mut state = ReconcileState::NotChecked;
        let mut raced = false;

        loop {
            debug!(id = %request.id, state = ?state, "reconcile");
            state = match state {
                ReconcileState::NotChecked | ReconcileState::Checking => {
                    match provider
                        .check_existence(request.name)
                        .await
                        .map_err(|source| provider_error(request, "checking", source))?
                    {
                        Some(existing) => ReconcileState::Exists(existing),
                        None if raced => {
                            return Err(CloudError::AlreadyExistsRace {
                                kind: request.kind,
                                name: request.name.to_string(),
                            });
                        }
                        None => ReconcileState::Absent,
                    }
                }
                ReconcileState::Exists(existing) => {
                    self.reporter.log(step, "exists, verifying ownership tags");
                    let observed = provider
                        .get_tags(&existing.id)
                        .await
                        .map_err(|source| provider_error(request, "reading tags of", source))?;

                    if let Err(mismatch) = tags::verify(&observed, self.identity, request.id) {
                        return Err(CloudError::ForeignResourceConflict {
                            id: request.id.clone(),
                            kind: request.kind,
                            name: request.name.to_string(),
                            mismatch,
                        });
                    }

                    let disposition = if raced {
                        Disposition::ExistingAfterRace
                    } else {
                        Disposition::Existing
                    };
                    ReconcileState::Reconciled(ReconcileOutcome {
                        disposition,
                        attributes: with_name(existing.attributes, request),
                    })
                }
                ReconcileState::Absent => {
                    self.reporter.log(step, "absent, creating");
                    match self.create(provider, request).await {
                        Ok(attributes) => ReconcileState::Reconciled(ReconcileOutcome {
                            disposition: Disposition::Created,
                            attributes: with_name(attributes, request),
                        }),
                        Err(RetryError::Terminal(ProviderError::AlreadyExists(message))) => {
                            if raced {
                                return Err(provider_error(
                                    request,
                                    "creating",
                                    ProviderError::AlreadyExists(message),
                                ));
                            }
                            self.reporter.log(step, "created concurrently, checking again");
                            raced = true;
                            ReconcileState::Checking
                        }
                        Err(RetryError::Terminal(source)) => {
                            return Err(provider_error(request, "creating", source));
                        }
                        Err(RetryError::Exhausted { attempts, last }) => {
                            return Err(CloudError::RetryExhausted {
                                id: request.id.clone(),
                                kind: request.kind,
                                attempts,
                                last,
                            });
                        }
                    }
                }
                ReconcileState::Reconciled(outcome) => return Ok(outcome),
            };
        }
    }

    async fn create(
        &self,
        provider: &dyn ResourceProvider,
        request: &ReconcileRequest<'_>,
    ) -> std::result::Result<Attributes, RetryError<ProviderError>> {
        let tags = tags::encode(self.identity, request.id);
        let create = CreateRequest {
            id: request.id,
            name: request.name,
            tags: &tags,
            spec: request.spec,
            references: request.references,
        };

        with_retry(self.retry, |err| provider.retry_class(err), || provider.create(&create)).await
    }
}

fn with_name(mut attributes: Attributes, request: &ReconcileRequest<'_>) -> Attributes {
    if request.kind.attributes().contains(&AttributeName::Name) {
        attributes
            .entry(AttributeName::Name)
            .or_insert_with(|| request.name.to_string());
    }
    attributes
}

fn provider_error(request: &ReconcileRequest<'_>, step: &'static str, source: ProviderError) -> CloudError {
    CloudError::Provider {
        id: request.id.clone(),
        kind: request.kind,
        step,
        source,
    }
}
