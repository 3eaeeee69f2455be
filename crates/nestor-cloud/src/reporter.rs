//! Progress reporting
//!
//! The engine narrates its work as a tree of steps. Implementations decide
//! how to render it: structured log events, a terminal UI, or an in-memory
//! recording for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

/// Opaque handle for an open step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepHandle(u64);

impl StepHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

pub type StepContext = BTreeMap<String, String>;

pub trait Reporter: Send + Sync {
    fn begin_step(&self, parent: Option<StepHandle>, title: &str, context: &StepContext) -> StepHandle;

    fn step_succeeded(&self, handle: StepHandle, result: &StepContext);

    fn step_failed(&self, handle: StepHandle, error: &dyn std::error::Error);

    fn log(&self, handle: StepHandle, message: &str);
}

/// Hands out step handles in creation order
#[derive(Debug, Default)]
pub struct StepCounter(AtomicU64);

impl StepCounter {
    pub fn next(&self) -> StepHandle {
        StepHandle(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Emits every step as a tracing event
#[derive(Debug, Default)]
pub struct TracingReporter {
    counter: StepCounter,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn render(context: &StepContext) -> String {
    context
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Reporter for TracingReporter {
    fn begin_step(&self, parent: Option<StepHandle>, title: &str, context: &StepContext) -> StepHandle {
        let handle = self.counter.next();
        info!(
            step = handle.raw(),
            parent = parent.map(|p| p.raw()),
            context = %render(context),
            "{title}"
        );
        handle
    }

    fn step_succeeded(&self, handle: StepHandle, result: &StepContext) {
        info!(step = handle.raw(), result = %render(result), "step succeeded");
    }

    fn step_failed(&self, handle: StepHandle, err: &dyn std::error::Error) {
        error!(step = handle.raw(), error = %err, "step failed");
    }

    fn log(&self, handle: StepHandle, message: &str) {
        info!(step = handle.raw(), "{message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Began {
        handle: StepHandle,
        parent: Option<StepHandle>,
        title: String,
        context: StepContext,
    },
    Succeeded {
        handle: StepHandle,
        result: StepContext,
    },
    Failed {
        handle: StepHandle,
        message: String,
    },
    Logged {
        handle: StepHandle,
        message: String,
    },
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    counter: StepCounter,
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ReportEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Titles of every step that was opened, in order
    pub fn titles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Began { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Failed { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Logged { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn begin_step(&self, parent: Option<StepHandle>, title: &str, context: &StepContext) -> StepHandle {
        let handle = self.counter.next();
        self.push(ReportEvent::Began {
            handle,
            parent,
            title: title.to_string(),
            context: context.clone(),
        });
        handle
    }

    fn step_succeeded(&self, handle: StepHandle, result: &StepContext) {
        self.push(ReportEvent::Succeeded {
            handle,
            result: result.clone(),
        });
    }

    fn step_failed(&self, handle: StepHandle, error: &dyn std::error::Error) {
        self.push(ReportEvent::Failed {
            handle,
            message: error.to_string(),
        });
    }

    fn log(&self, handle: StepHandle, message: &str) {
        self.push(ReportEvent::Logged {
            handle,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_nested() {
        let reporter = RecordingReporter::new();
        let root = reporter.begin_step(None, "provision", &StepContext::new());
        let child = reporter.begin_step(Some(root), "reconcile", &StepContext::new());
        assert_ne!(root, child);

        reporter.log(child, "exists");
        reporter.step_succeeded(child, &StepContext::new());
        reporter.step_succeeded(root, &StepContext::new());

        let events = reporter.events();
        assert_eq!(events.len(), 5);
        assert!(matches!(
            &events[1],
            ReportEvent::Began { parent: Some(p), .. } if *p == root
        ));
        assert_eq!(reporter.titles(), vec!["provision", "reconcile"]);
        assert_eq!(reporter.logs(), vec!["exists"]);
    }

    #[test]
    fn test_failure_is_recorded() {
        let reporter = RecordingReporter::new();
        let step = reporter.begin_step(None, "wire", &StepContext::new());
        let error = std::io::Error::other("boom");
        reporter.step_failed(step, &error);

        assert_eq!(reporter.failures(), vec!["boom"]);
    }
}
