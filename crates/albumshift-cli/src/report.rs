//! Human-readable reports printed to stdout.

use albumshift_core::{ExecutionProgress, Plan, PlanCreated, PlanSummary, RunOutcome, RunReport};
use std::path::Path;

pub fn print_summary(label: &str, summary: &PlanSummary) {
    println!("{}: {}", label, summary);
}

pub fn print_plan_created(created: &PlanCreated) {
    let stats = &created.stats;
    println!("Plan written to {}", created.plan_path.display());
    println!(
        "  {} asset(s) in {} folder(s), {} skipped",
        stats.assets, stats.folders, stats.skipped
    );
    if stats.sidecars_applied + stats.sidecars_rejected > 0 {
        println!(
            "  sidecars: {} applied, {} rejected",
            stats.sidecars_applied, stats.sidecars_rejected
        );
    }
    if stats.capture_times > 0 {
        println!("  capture times read: {}", stats.capture_times);
    }
    print_summary("Status", &created.summary);

    if !created.folders.is_empty() {
        println!("Folders:");
        for (folder, count) in &created.folders {
            println!("  {:<40} {:>6}", folder, count);
        }
    }
}

pub fn print_progress(progress: &ExecutionProgress) {
    let done = progress.total - progress.remaining;
    println!(
        "[{:>5}/{}] {:<11} {}",
        done,
        progress.total,
        progress.current_status.as_str(),
        progress.current
    );
}

pub fn print_run_report(report: &RunReport) {
    if report.reset_failed > 0 {
        println!("Reset {} failed unit(s) for another try", report.reset_failed);
    }
    print_summary("Before", &report.before);
    print_summary("After", &report.after);
    println!(
        "{} unit(s) attempted, {} destination call(s), {} cooldown(s)",
        report.units_attempted, report.destination_calls, report.cooldowns
    );

    match &report.outcome {
        RunOutcome::Finished => println!("Run finished"),
        RunOutcome::Interrupted => println!("Run interrupted; run `execute` again to continue"),
        RunOutcome::Aborted(reason) => println!("Run aborted: {}", reason),
    }
    if report.dry_run {
        println!("Dry run: {} was not changed", report.plan_path.display());
        return;
    }

    if report.after.failed > 0 {
        println!(
            "{} unit(s) failed; see `albumshift status {} --failed` for their errors",
            report.after.failed,
            report.plan_path.display()
        );
    }
}

pub fn print_status(plan: &Plan) {
    println!("Export:      {}", plan.export_root.display());
    println!("Version:     {}", plan.plan_version);
    println!("Layout:      {}", plan.layout);
    println!("Updated:     {}", plan.updated_at.to_rfc3339());
    let summary = plan.summary();
    println!("Total:       {}", summary.total);
    println!("Completed:   {}", summary.completed);
    println!("Skipped:     {}", summary.skipped);
    println!("Failed:      {}", summary.failed);
    println!("In progress: {}", summary.in_progress);
    println!("Pending:     {}", summary.pending);
}

pub fn print_failed(plan: &Plan) {
    let mut any = false;
    for unit in plan.failed_units() {
        any = true;
        println!(
            "{}  {}  (attempts: {})\n    {}",
            unit.unit_id,
            unit.relative_path,
            unit.attempt_count,
            unit.last_error.as_deref().unwrap_or("no error recorded")
        );
    }
    if !any {
        println!("No failed units");
    }
}

pub fn print_retry(reset: usize, plan_path: &Path) {
    if reset == 0 {
        println!("No failed units to reset");
    } else {
        println!(
            "{} unit(s) reset to pending; run `albumshift execute {}` to import them",
            reset,
            plan_path.display()
        );
    }
}
