use crate::project::SyncPlan;
use parado_core::{AgentOutcome, AgentStatus, RunReport, RunStatus};
use std::path::Path;

pub(crate) fn print_run_report(report: &RunReport) {
    for line in &report.stdout {
        println!("{line}");
    }
    for line in &report.stderr {
        eprintln!("{line}");
    }
    match &report.status {
        RunStatus::Completed { value: Some(value) } => println!("{value}"),
        RunStatus::Completed { value: None } => {}
        RunStatus::Failed { message } => eprintln!("error: {message}"),
        RunStatus::Rejected => eprintln!("[parado] a run is already in progress"),
    }
}

pub(crate) fn print_agent_outcome(outcome: &AgentOutcome) {
    for record in &outcome.actions {
        let status = if record.succeeded { "ok" } else { "error" };
        eprintln!("[parado] action {} {status}", record.action);
        if !record.succeeded {
            if let Some(error) = record.result.get("error").and_then(|e| e.as_str()) {
                eprintln!("  {error}");
            }
        }
    }
    match outcome.status {
        AgentStatus::Skipped => {}
        AgentStatus::ModelFailed | AgentStatus::Rejected => eprintln!("{}", outcome.answer),
        _ => println!("{}", outcome.answer),
    }
}

pub(crate) fn print_sync_plan(plan: &SyncPlan, root: &Path, dry_run: bool) {
    if plan.is_empty() {
        eprintln!("[parado] no file changes");
        return;
    }
    let verb = if dry_run { "would write" } else { "wrote" };
    for (name, _) in &plan.write {
        eprintln!("[parado] {verb} {}", root.join(name).display());
    }
    let verb = if dry_run { "would remove" } else { "removed" };
    for name in &plan.remove {
        eprintln!("[parado] {verb} {}", root.join(name).display());
    }
    for name in &plan.conflicts {
        eprintln!(
            "[parado] skipped {}: file exists on disk but was not loaded",
            root.join(name).display()
        );
    }
}
