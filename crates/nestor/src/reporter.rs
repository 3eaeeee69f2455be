//! Terminal rendering of provisioning steps

use colored::Colorize;
use nestor_cloud::{Reporter, StepContext, StepHandle, reporter::StepCounter};
use std::collections::HashMap;
use std::sync::Mutex;

/// Prints steps as an indented tree
#[derive(Debug, Default)]
pub struct TermReporter {
    counter: StepCounter,
    depth: Mutex<HashMap<StepHandle, usize>>,
}

impl TermReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&self, handle: StepHandle) -> String {
        let depth = self
            .depth
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&handle)
            .copied()
            .unwrap_or(0);
        "  ".repeat(depth)
    }
}

fn render(context: &StepContext) -> String {
    context
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Reporter for TermReporter {
    fn begin_step(&self, parent: Option<StepHandle>, title: &str, context: &StepContext) -> StepHandle {
        let handle = self.counter.next();
        let depth = {
            let mut depths = self.depth.lock().unwrap_or_else(|p| p.into_inner());
            let depth = parent.and_then(|p| depths.get(&p).map(|d| d + 1)).unwrap_or(0);
            depths.insert(handle, depth);
            depth
        };

        let indent = "  ".repeat(depth);
        if context.is_empty() {
            println!("{indent}{} {}", "▶".blue(), title.bold());
        } else {
            println!("{indent}{} {} {}", "▶".blue(), title.bold(), render(context).dimmed());
        }
        handle
    }

    fn step_succeeded(&self, handle: StepHandle, result: &StepContext) {
        let indent = self.indent(handle);
        println!("{indent}  {} {}", "✓".green(), render(result).dimmed());
    }

    fn step_failed(&self, handle: StepHandle, error: &dyn std::error::Error) {
        let indent = self.indent(handle);
        println!("{indent}  {} {}", "✗".red(), error.to_string().red());
    }

    fn log(&self, handle: StepHandle, message: &str) {
        let indent = self.indent(handle);
        println!("{indent}  {}", message.dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_steps_indent() {
        let reporter = TermReporter::new();
        let root = reporter.begin_step(None, "provision app/dev", &StepContext::new());
        let child = reporter.begin_step(Some(root), "s3_bucket app-dev-store", &StepContext::new());
        let grandchild = reporter.begin_step(Some(child), "retry", &StepContext::new());

        assert_eq!(reporter.indent(root), "");
        assert_eq!(reporter.indent(child), "  ");
        assert_eq!(reporter.indent(grandchild), "    ");
    }
}
