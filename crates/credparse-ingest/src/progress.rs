//! Progress display
//!
//! Renders one status string per active worker and keeps rewriting a single
//! terminal line until every worker has finished.

use indicatif::{HumanCount, HumanDuration};
use std::io::{self, Write};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::WorkerRegistry;
use crate::worker::{WorkerReport, WorkerState};

const WORKER_SEPARATOR: &str = " | ";

/// Status text for one worker, e.g.
/// `dump.txt: 42.0% (4,200/10,000) 1,234 lines/s ETA 5 seconds`
pub fn render(report: &WorkerReport) -> String {
    if let Some(error) = &report.error {
        return format!("{}: failed: {}", report.name, error);
    }

    match report.state {
        WorkerState::Initialized => format!("{}: waiting", report.name),
        WorkerState::Loading => format!("{}: counting lines", report.name),
        WorkerState::Running | WorkerState::Finished => {
            let mut line = format!(
                "{}: {:.1}% ({}/{}) {} lines/s",
                report.name,
                report.percent(),
                HumanCount(report.processed),
                HumanCount(report.total_lines),
                HumanCount(report.speed() as u64),
            );
            if report.state == WorkerState::Running {
                if let Some(eta) = report.eta() {
                    line.push_str(&format!(" ETA {}", HumanDuration(eta)));
                }
            }
            line
        },
    }
}

/// A single terminal line that is overwritten in place
pub struct StatusLine<W: Write> {
    writer: W,
    last_len: usize,
}

impl<W: Write> StatusLine<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, last_len: 0 }
    }

    /// Replace the previous text, padding with spaces if the new text is shorter
    pub fn update(&mut self, text: &str) -> io::Result<()> {
        let pad = self.last_len.saturating_sub(text.len());
        write!(self.writer, "\r{}{}", text, " ".repeat(pad))?;
        self.writer.flush()?;
        self.last_len = text.len();
        Ok(())
    }

    pub fn clear(&mut self) -> io::Result<()> {
        if self.last_len > 0 {
            write!(self.writer, "\r{}\r", " ".repeat(self.last_len))?;
            self.writer.flush()?;
            self.last_len = 0;
        }
        Ok(())
    }
}

/// Poll the registry every `interval` and redraw the status line.
///
/// Returns once no worker is active or `stop` is cancelled. The line is
/// cleared before returning.
pub async fn report_progress<W: Write>(
    registry: &WorkerRegistry,
    interval: Duration,
    writer: W,
    stop: CancellationToken,
) {
    let mut line = StatusLine::new(writer);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {},
        }

        let active = registry.active();
        if active.is_empty() {
            break;
        }

        let text = active
            .iter()
            .map(|status| render(&status.report()))
            .collect::<Vec<_>>()
            .join(WORKER_SEPARATOR);

        if let Err(e) = line.update(&text) {
            debug!(error = %e, "Progress output unavailable, stopping reporter");
            break;
        }
    }

    if let Err(e) = line.clear() {
        debug!(error = %e, "Failed to clear progress line");
    }
}
