//! End-of-run summary

use credparse_ingest::pipeline::RunSummary;
use credparse_ingest::progress::render;
use indicatif::{HumanCount, HumanDuration};

/// One line per input file, then totals
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .reports
        .iter()
        .map(|report| {
            if report.is_failed() {
                render(report)
            } else {
                format!("{} in {}", render(report), HumanDuration(report.elapsed))
            }
        })
        .collect();

    let mut totals = format!(
        "{} records written, {} lines failed to parse",
        HumanCount(summary.output.written),
        HumanCount(summary.errors.written),
    );
    let dropped = summary.output.dropped + summary.errors.dropped;
    if dropped > 0 {
        totals.push_str(&format!(", {} dropped", HumanCount(dropped)));
    }
    let failed = summary.failed_workers();
    if failed > 0 {
        totals.push_str(&format!(", {failed} of {} files failed", summary.reports.len()));
    }
    lines.push(totals);

    if summary.cancelled {
        lines.push("Interrupted: files were only partially processed".to_string());
    }
    lines
}
