//! Result of a provisioning run

use crate::reconcile::Disposition;
use crate::resource::{Attributes, LogicalResourceId, ResourceKind};
use crate::wiring::WiringOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of reconciling a single resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutcome {
    pub id: LogicalResourceId,
    pub kind: ResourceKind,

    /// Physical name
    pub name: String,

    pub disposition: Disposition,

    pub attributes: Attributes,
}

/// Result of a successful provisioning run
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub started_at: DateTime<Utc>,

    /// Resources in reconciliation order
    pub resources: Vec<ResourceOutcome>,

    /// Applied wiring rules in declaration order
    pub wiring: Vec<WiringOutcome>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ProvisionReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            resources: Vec::new(),
            wiring: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn resources_with(&self, disposition: Disposition) -> Vec<&ResourceOutcome> {
        self.resources
            .iter()
            .filter(|r| r.disposition == disposition)
            .collect()
    }

    pub fn summary(&self) -> ProvisionSummary {
        ProvisionSummary {
            created: self.resources_with(Disposition::Created).len(),
            unchanged: self.resources.len() - self.resources_with(Disposition::Created).len(),
            wired: self.wiring.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionSummary {
    pub created: usize,
    pub unchanged: usize,
    pub wired: usize,
}

impl std::fmt::Display for ProvisionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} already existed, {} wiring rules applied",
            self.created, self.unchanged, self.wired
        )
    }
}
