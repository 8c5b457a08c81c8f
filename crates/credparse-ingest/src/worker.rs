//! Per-file worker
//!
//! A [`FileWorker`] owns one input file for its whole life:
//!
//! 1. `Initialized`: constructed and registered, nothing opened yet
//! 2. `Loading`: counts the file's lines so progress and ETA can be derived,
//!    then attaches its sinks
//! 3. `Running`: reopens the file and streams it line by line through
//!    [`parse_line`], submitting each outcome to the output or error sink
//! 4. `Finished`: detaches its sinks, stamps the end time and reports
//!
//! States only move forward. A worker whose file cannot be read still walks
//! through to `Finished` with its error recorded; sibling workers carry on.
//!
//! The cancellation token is checked once per line. A cancelled worker stops
//! reading, keeps everything already submitted and finishes normally.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ParseConfig;
use crate::delimiter::resolve;
use crate::record::{Entry, ParseFailure, Record};
use crate::registry::WorkerRegistry;
use crate::sink::{Sink, SinkError};
use crate::split::split_line;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Errors that end a worker early
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("sink rejected line {line}: {source}")]
    Submit {
        line: u64,
        #[source]
        source: SinkError,
    },
}

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerState {
    Initialized = 0,
    Loading = 1,
    Running = 2,
    Finished = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Initialized,
            1 => WorkerState::Loading,
            2 => WorkerState::Running,
            _ => WorkerState::Finished,
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            WorkerState::Initialized => Some(WorkerState::Loading),
            WorkerState::Loading => Some(WorkerState::Running),
            WorkerState::Running => Some(WorkerState::Finished),
            WorkerState::Finished => None,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Initialized => write!(f, "initialized"),
            WorkerState::Loading => write!(f, "loading"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Default)]
struct Timing {
    started: Option<Instant>,
    ended: Option<Instant>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live progress of one worker, shared with the registry.
///
/// Only the owning worker writes; anyone may read.
#[derive(Debug)]
pub struct WorkerStatus {
    path: PathBuf,
    name: String,
    state: AtomicU8,
    total: AtomicU64,
    processed: AtomicU64,
    parsed: AtomicU64,
    failed: AtomicU64,
    timing: Mutex<Timing>,
    error: Mutex<Option<String>>,
}

impl WorkerStatus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path,
            name,
            state: AtomicU8::new(WorkerState::Initialized as u8),
            total: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            parsed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timing: Mutex::new(Timing::default()),
            error: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state() == WorkerState::Finished
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Move to the state after the current one.
    pub(crate) fn advance(&self) -> Option<WorkerState> {
        let current = self.state();
        let next = current.next()?;
        self.state
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| next)
    }

    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    fn mark_started(&self) {
        lock(&self.timing).started = Some(Instant::now());
    }

    fn mark_ended(&self) {
        lock(&self.timing).ended = Some(Instant::now());
    }

    fn record_line(&self, entry: &Entry) {
        match entry {
            Entry::Record(_) => self.parsed.fetch_add(1, Ordering::Relaxed),
            Entry::Failure(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        self.processed.fetch_add(1, Ordering::AcqRel);
    }

    fn set_error(&self, message: String) {
        *lock(&self.error) = Some(message);
    }

    /// Consistent point-in-time view of this worker
    pub fn report(&self) -> WorkerReport {
        let state = self.state();
        let elapsed = {
            let timing = lock(&self.timing);
            match (timing.started, timing.ended) {
                (Some(start), Some(end)) => end.duration_since(start),
                (Some(start), None) => start.elapsed(),
                _ => Duration::ZERO,
            }
        };

        WorkerReport {
            path: self.path.clone(),
            name: self.name.clone(),
            state,
            total_lines: self.total.load(Ordering::Acquire),
            processed: self.processed.load(Ordering::Acquire),
            parsed: self.parsed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed,
            error: lock(&self.error).clone(),
        }
    }
}

/// Snapshot of a worker's progress, also its final report
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub path: PathBuf,
    pub name: String,
    pub state: WorkerState,
    pub total_lines: u64,
    pub processed: u64,
    /// Lines sent to the output sink
    pub parsed: u64,
    /// Lines sent to the error sink
    pub failed: u64,
    pub elapsed: Duration,
    /// Set when the worker stopped on a file or sink error
    pub error: Option<String>,
}

impl WorkerReport {
    /// Percent of lines processed; 0 when the line count is unknown or zero
    pub fn percent(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        (self.processed as f64 / self.total_lines as f64 * 100.0).min(100.0)
    }

    /// Lines per second; 0 before any time has elapsed
    pub fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.processed as f64 / secs
    }

    /// Estimated time remaining, unknown until a speed is measurable
    pub fn eta(&self) -> Option<Duration> {
        let speed = self.speed();
        if speed <= 0.0 {
            return None;
        }
        let remaining = self.total_lines.saturating_sub(self.processed);
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Called once with the final report when a worker finishes
pub type CompletionCallback = Arc<dyn Fn(&WorkerReport) + Send + Sync>;

/// Resolve, split and decode one raw line.
///
/// Trailing whitespace (including the newline) is stripped first.
pub fn parse_line(config: &ParseConfig, line_no: u64, raw: &[u8]) -> Entry {
    let line = raw.trim_ascii_end();

    match resolve(line, &config.delimiters, config.strategy) {
        Some(delimiter) => {
            let fields = split_line(line, delimiter, config.field_count);
            Record::new(line_no, config.decoder.decode(fields)).into()
        },
        None => ParseFailure::no_delimiter(line_no, line).into(),
    }
}

/// Count lines the way [`FileWorker`] streams them: one per `\n`, plus a
/// final unterminated line if present.
pub async fn count_lines(path: &Path) -> Result<u64, WorkerError> {
    let mut file = File::open(path).await.map_err(|source| WorkerError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut count = 0u64;
    let mut last = None;

    loop {
        let n = file.read(&mut buf).await.map_err(|source| WorkerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last = Some(buf[n - 1]);
    }

    if last.is_some_and(|b| b != b'\n') {
        count += 1;
    }
    Ok(count)
}

/// Parses one input file into its sinks
pub struct FileWorker {
    status: Arc<WorkerStatus>,
    parse: Arc<ParseConfig>,
    output: Arc<Sink>,
    errors: Arc<Sink>,
    cancel: CancellationToken,
    on_complete: Option<CompletionCallback>,
}

impl FileWorker {
    /// Create a worker and register its status with `registry`
    pub fn new(
        path: impl Into<PathBuf>,
        parse: Arc<ParseConfig>,
        output: Arc<Sink>,
        errors: Arc<Sink>,
        cancel: CancellationToken,
        registry: &WorkerRegistry,
    ) -> Self {
        let status = Arc::new(WorkerStatus::new(path));
        registry.register(Arc::clone(&status));

        Self {
            status,
            parse,
            output,
            errors,
            cancel,
            on_complete: None,
        }
    }

    pub fn on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn status(&self) -> Arc<WorkerStatus> {
        Arc::clone(&self.status)
    }

    /// Run on the tokio runtime
    pub fn spawn(self) -> JoinHandle<WorkerReport> {
        tokio::spawn(self.run())
    }

    /// Process the file to completion or cancellation.
    ///
    /// Consumes the worker, so the finishing steps run exactly once.
    pub async fn run(self) -> WorkerReport {
        let mut attached = Vec::new();
        let outcome = self.execute(&mut attached).await;
        self.finish(outcome, attached).await
    }

    async fn execute(&self, attached: &mut Vec<Arc<Sink>>) -> Result<(), WorkerError> {
        let path = self.status.path().to_path_buf();
        self.status.advance();
        self.status.mark_started();

        let total = count_lines(&path).await?;
        self.status.set_total(total);
        debug!(file = %path.display(), lines = total, "Counted lines");

        for sink in [&self.output, &self.errors] {
            sink.attach().await?;
            attached.push(Arc::clone(sink));
        }

        self.status.advance();
        self.stream(&path).await
    }

    async fn stream(&self, path: &Path) -> Result<(), WorkerError> {
        let file = File::open(path).await.map_err(|source| WorkerError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut buf = Vec::new();
        let mut line_no = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                info!(file = %path.display(), line = line_no, "Stopping early on cancellation");
                break;
            }

            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| WorkerError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            line_no += 1;

            let entry = parse_line(&self.parse, line_no, &buf);
            let sink = match entry {
                Entry::Record(_) => &self.output,
                Entry::Failure(_) => &self.errors,
            };
            sink.submit(&entry).await.map_err(|source| WorkerError::Submit {
                line: entry.line(),
                source,
            })?;
            self.status.record_line(&entry);
        }

        Ok(())
    }

    async fn finish(self, outcome: Result<(), WorkerError>, attached: Vec<Arc<Sink>>) -> WorkerReport {
        for sink in attached {
            if let Err(e) = sink.detach().await {
                warn!(file = %self.status.path().display(), sink = %sink.describe(), error = %e, "Failed to release sink");
            }
        }

        if let Err(e) = outcome {
            error!(file = %self.status.path().display(), error = %e, "Worker failed");
            self.status.set_error(e.to_string());
        }

        self.status.mark_ended();
        while self.status.advance().is_some() {}

        let report = self.status.report();
        info!(
            file = %report.path.display(),
            processed = report.processed,
            parsed = report.parsed,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Worker finished"
        );

        if let Some(callback) = &self.on_complete {
            callback(&report);
        }
        report
    }
}
