//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for a finished batch.

use crate::metrics;
use crate::model::{RunState, RunStatus};
use crate::orchestrator::{BatchOutcome, RequestOutcome};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn state_label(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "idle",
        RunState::Queued => "queued",
        RunState::Running => "running",
        RunState::Finished => "finished",
        RunState::Failed => "failed",
        RunState::Cancelled => "cancelled",
    }
}

fn count(v: Option<i64>) -> String {
    v.map_or_else(|| "-".to_string(), |n| n.to_string())
}

/// Wall-clock duration of a run, rounded to whole seconds.
fn run_duration(status: &RunStatus) -> Option<String> {
    let elapsed = status.run_finish_time? - status.run_start_time?;
    let secs = u64::try_from(elapsed.whole_seconds()).ok()?;
    Some(humantime::format_duration(std::time::Duration::from_secs(secs)).to_string())
}

fn push_request_lines(lines: &mut Vec<String>, entry: &RequestOutcome) {
    let status = &entry.status;
    let mut line = format!("{}: {}", entry.request.name, state_label(status.state));
    if status.iterations_total.is_some() || status.iterations_completed.is_some() {
        line.push_str(&format!(
            ", iterations {}/{}",
            count(status.iterations_completed),
            count(status.iterations_total)
        ));
        if let Some(failed) = status.iterations_failed.filter(|n| *n > 0) {
            line.push_str(&format!(" ({failed} failed)"));
        }
    }
    if let Some(duration) = run_duration(status) {
        line.push_str(&format!(", took {duration}"));
    }
    lines.push(line);

    if let Some(folder) = status.result_data_folder.as_deref() {
        lines.push(format!("  Results: {}", folder.display()));
    } else if let Some(log) = status.log_file_path.as_deref() {
        lines.push(format!("  Log: {}", log.display()));
    }
    if let Some(stats) = metrics::compute_convergence_stats(&status.convergence_series) {
        lines.push(format!(
            "  Convergence: last {:.5} min {:.5} max {:.5} avg {:.5} ({} samples)",
            stats.last, stats.min, stats.max, stats.mean, stats.samples
        ));
    }
}

/// Build a text summary from the final state of a batch.
pub(crate) fn build_text_summary(outcome: &BatchOutcome) -> TextSummary {
    let mut lines = Vec::new();

    for entry in &outcome.requests {
        push_request_lines(&mut lines, entry);
    }

    match (&outcome.last_error, outcome.cancelled) {
        (Some(e), _) => lines.push(format!("Batch ended with an error: {e}")),
        (None, true) => lines.push("Batch cancelled.".to_string()),
        (None, false) => lines.push("Batch finished successfully.".to_string()),
    }

    TextSummary { lines }
}
