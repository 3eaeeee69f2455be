//! Nestor resource reconciliation
//!
//! Core of the nestor provisioning tool: ensures a set of declared cloud
//! resources exists, identifies the ones it owns through identity tags, and
//! wires them together once they all exist.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   nestor CLI                     │
//! │            (nestor provision / deploy)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │  DeploymentPlan
//! ┌─────────────────▼───────────────────────────────┐
//! │                 nestor-cloud                     │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Reconciler  │  │   Registry   │             │
//! │  └──────┬───────┘  └──────┬───────┘             │
//! │  ┌──────▼───────────────────▼───────┐           │
//! │  │          WiringResolver           │           │
//! │  └──────────────────────────────────┘           │
//! │  trait ResourceProvider / WiringProvider        │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  nestor-cloud │ │   in-memory   │
//! │      -aws     │ │     cloud     │
//! └───────────────┘ └───────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod memory;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod reporter;
pub mod resource;
pub mod retry;
pub mod tags;
pub mod wiring;

// Re-exports
pub use engine::{DeploymentPlan, Provisioned, Provisioner};
pub use error::{CloudError, ProviderError, Result};
pub use provider::{CreateRequest, ExistingResource, ProviderSet, ResourceProvider, WiringProvider};
pub use reconcile::{Disposition, ReconcileOutcome, ReconcileRequest, Reconciler};
pub use registry::ResourceRegistry;
pub use report::{ProvisionReport, ProvisionSummary, ResourceOutcome};
pub use reporter::{RecordingReporter, ReportEvent, Reporter, StepContext, StepHandle, TracingReporter};
pub use resource::{
    AttributeName, Attributes, DeclaredResource, FunctionSpec, LogicalResourceId, NameTemplate,
    RegisteredResource, ResourceKind, ResourceSpec, RoleSpec,
};
pub use retry::{RetryClass, RetryConfig, RetryError, with_retry};
pub use tags::{DeploymentIdentity, TagMap, TagMismatch};
pub use wiring::{
    AccessGrant, GrantTarget, InvokePermission, NotificationTarget, StatementScope, WiringOutcome, WiringResolver,
    WiringRule, check_statement_ids,
};
