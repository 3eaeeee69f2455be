//! Error types for resource reconciliation and wiring

use crate::resource::{AttributeName, LogicalResourceId, ResourceKind};
use crate::retry::RetryClass;
use crate::tags::TagMismatch;
use thiserror::Error;

/// Errors raised by provider adapters.
///
/// Adapters classify their SDK failures into one of these variants so the
/// engine can decide between retrying, re-checking and aborting without
/// knowing anything about the underlying cloud API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The resource was created concurrently (or by an earlier, interrupted run)
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Rate limit or soft quota hit
    #[error("throttled: {0}")]
    Throttled(String),

    /// A dependency created moments ago is not visible yet (eventual consistency)
    #[error("not yet propagated: {0}")]
    Propagation(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{code}: {message}")]
    Api { code: String, message: String },
}

impl ProviderError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ProviderError::AlreadyExists(_))
    }

    /// Default retry policy: throttling and propagation lag are transient,
    /// everything else is terminal.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ProviderError::Throttled(_) | ProviderError::Propagation(_) => RetryClass::Retryable,
            _ => RetryClass::Terminal,
        }
    }
}

/// Errors raised by the reconciliation engine
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("provider error while {step} {id} ({kind}): {source}")]
    Provider {
        id: LogicalResourceId,
        kind: ResourceKind,
        step: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error(
        "{kind} '{name}' already exists but is not owned by this deployment ({mismatch}); \
         refusing to adopt it"
    )]
    ForeignResourceConflict {
        id: LogicalResourceId,
        kind: ResourceKind,
        name: String,
        mismatch: TagMismatch,
    },

    #[error("wiring rule #{rule_index} references unknown resource: {missing_id}")]
    DanglingReference {
        rule_index: usize,
        missing_id: LogicalResourceId,
    },

    #[error("resource {id} is registered as {existing}, cannot register it as {requested}")]
    KindConflict {
        id: LogicalResourceId,
        existing: ResourceKind,
        requested: ResourceKind,
    },

    #[error("gave up on {id} ({kind}) after {attempts} attempts: {last}")]
    RetryExhausted {
        id: LogicalResourceId,
        kind: ResourceKind,
        attempts: u32,
        last: ProviderError,
    },

    #[error("{kind} '{name}' reported as existing on create but not found on re-check")]
    AlreadyExistsRace { kind: ResourceKind, name: String },

    #[error("resource {id} depends on undeclared resource {dependency}")]
    UnknownDependency {
        id: LogicalResourceId,
        dependency: LogicalResourceId,
    },

    #[error("circular dependency between resources: {0}")]
    CircularDependency(String),

    #[error("resource {0} is declared more than once")]
    DuplicateDeclaration(LogicalResourceId),

    #[error("no provider registered for {0}")]
    ProviderNotRegistered(ResourceKind),

    #[error("resource {id} has no {attribute} attribute")]
    MissingAttribute {
        id: LogicalResourceId,
        attribute: AttributeName,
    },

    #[error("wiring rule #{rule_index} expects {id} to be {expected}, found {actual}")]
    WiringKindMismatch {
        rule_index: usize,
        id: LogicalResourceId,
        expected: &'static str,
        actual: ResourceKind,
    },

    #[error("wiring rules #{first} and #{second} derive the same statement id '{statement_id}'")]
    DuplicateStatementId {
        statement_id: String,
        first: usize,
        second: usize,
    },

    #[error("wiring rule #{rule_index} ({relation}) failed: {source}")]
    Wiring {
        rule_index: usize,
        relation: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("wiring rule #{rule_index} ({relation}) gave up after {attempts} attempts: {last}")]
    WiringRetryExhausted {
        rule_index: usize,
        relation: &'static str,
        attempts: u32,
        last: ProviderError,
    },
}

impl CloudError {
    /// True when every allowed attempt failed with a retryable error
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(
            self,
            CloudError::RetryExhausted { .. } | CloudError::WiringRetryExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
