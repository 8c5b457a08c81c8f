//! Run orchestration
//!
//! [`Pipeline::run`] builds the sinks for a [`RunConfig`], starts one
//! [`FileWorker`] per input file, drives the progress display and collects
//! every worker's final report.
//!
//! Sink construction happens before any worker starts. A database that cannot
//! be reached, an output file that cannot be created, or output paths that
//! would clobber an input abort the run up front. Once workers are running,
//! failures stay inside the worker that hit them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{
    ConsoleConfig, DatabaseConfig, ErrorOutputConfig, FileSinkConfig, OutputConfig, RunConfig,
};
use crate::progress::report_progress;
use crate::registry::WorkerRegistry;
use crate::sink::{ConsoleSink, DatabaseSink, FileSink, PostgresBackend, Sink, SinkStats};
use crate::worker::{CompletionCallback, FileWorker, WorkerReport};
use crate::{CredParseError, Result};

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// One report per input file, in input order
    pub reports: Vec<WorkerReport>,
    /// Totals across all output sinks
    pub output: SinkStats,
    /// Totals across all error sinks
    pub errors: SinkStats,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed_workers(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failed()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_workers() == 0
    }
}

/// Parses a set of files concurrently into the configured sinks
pub struct Pipeline {
    config: RunConfig,
    registry: Arc<WorkerRegistry>,
    cancel: CancellationToken,
    on_complete: Option<CompletionCallback>,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            registry: Arc::new(WorkerRegistry::new()),
            cancel: CancellationToken::new(),
            on_complete: None,
        }
    }

    /// Use an externally owned token, e.g. one cancelled by a signal handler
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Called by each worker as it finishes
    pub fn on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        Arc::clone(&self.registry)
    }

    pub async fn run(&self, files: &[PathBuf]) -> Result<RunSummary> {
        self.config.validate()?;
        if files.is_empty() {
            return Err(CredParseError::config("No input files given"));
        }

        // Error files first, so every path problem surfaces before a database connect
        let mut sinks = SinkBuilder::new(files);
        let errors = sinks.errors(&self.config.errors, files)?;
        let outputs = sinks.outputs(&self.config.output, files).await?;

        // Hold every sink open for the whole run so a worker that finishes
        // early cannot close a sink a slower sibling has yet to attach
        let held = distinct(outputs.iter().chain(errors.iter()));
        hold(&held).await?;

        let parse = Arc::new(self.config.parse.clone());
        let workers: Vec<FileWorker> = files
            .iter()
            .zip(outputs.iter().zip(errors.iter()))
            .map(|(path, (output, errors))| {
                let worker = FileWorker::new(
                    path,
                    Arc::clone(&parse),
                    Arc::clone(output),
                    Arc::clone(errors),
                    self.cancel.clone(),
                    &self.registry,
                );
                match &self.on_complete {
                    Some(callback) => worker.on_complete(Arc::clone(callback)),
                    None => worker,
                }
            })
            .collect();

        info!(files = files.len(), "Starting workers");
        let statuses: Vec<_> = workers.iter().map(FileWorker::status).collect();
        let handles: Vec<_> = workers.into_iter().map(FileWorker::spawn).collect();

        let stop_reporter = CancellationToken::new();
        let reporter = async {
            if self.config.show_progress {
                report_progress(
                    &self.registry,
                    self.config.refresh_interval,
                    std::io::stderr(),
                    stop_reporter.clone(),
                )
                .await;
            }
        };
        let collect = async {
            let mut reports = Vec::with_capacity(handles.len());
            for (handle, status) in handles.into_iter().zip(statuses) {
                match handle.await {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        error!(file = %status.path().display(), error = %e, "Worker task aborted");
                        let mut report = status.report();
                        report.error = Some(format!("worker task aborted: {e}"));
                        reports.push(report);
                    },
                }
            }
            stop_reporter.cancel();
            reports
        };
        let ((), reports) = tokio::join!(reporter, collect);
        release(&held).await;

        let summary = RunSummary {
            reports,
            output: total_stats(&outputs),
            errors: total_stats(&errors),
            cancelled: self.cancel.is_cancelled(),
        };
        info!(
            written = summary.output.written,
            dropped = summary.output.dropped,
            failed_lines = summary.errors.written,
            failed_workers = summary.failed_workers(),
            "Run complete"
        );
        Ok(summary)
    }
}

/// Which channel a file sink serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Output,
    Errors,
}

/// Creates sinks, sharing one instance wherever several inputs map to the
/// same destination
struct SinkBuilder {
    inputs: HashSet<PathBuf>,
    files: HashMap<PathBuf, (Channel, Arc<Sink>)>,
}

impl SinkBuilder {
    fn new(files: &[PathBuf]) -> Self {
        Self {
            inputs: files.iter().map(|f| resolve_path(f)).collect(),
            files: HashMap::new(),
        }
    }

    async fn outputs(&mut self, config: &OutputConfig, files: &[PathBuf]) -> Result<Vec<Arc<Sink>>> {
        match config {
            OutputConfig::Console(console) => Ok(shared(console_sink(console), files.len())),
            OutputConfig::Database(db) => {
                let sink = database_sink(db).await?;
                Ok(shared(sink, files.len()))
            },
            OutputConfig::File(file) => files
                .iter()
                .map(|input| self.file_sink(file, input, Channel::Output))
                .collect(),
        }
    }

    fn errors(&mut self, config: &ErrorOutputConfig, files: &[PathBuf]) -> Result<Vec<Arc<Sink>>> {
        match config {
            ErrorOutputConfig::Console(console) => Ok(shared(console_sink(console), files.len())),
            ErrorOutputConfig::File(file) => files
                .iter()
                .map(|input| self.file_sink(file, input, Channel::Errors))
                .collect(),
        }
    }

    fn file_sink(
        &mut self,
        config: &FileSinkConfig,
        input: &Path,
        channel: Channel,
    ) -> Result<Arc<Sink>> {
        let path = config.output_path(input);
        let key = resolve_path(&path);
        if self.inputs.contains(&key) {
            return Err(CredParseError::config(format!(
                "Output file {} would overwrite an input file",
                path.display()
            )));
        }

        match self.files.get(&key) {
            Some((existing, sink)) if *existing == channel => Ok(Arc::clone(sink)),
            Some(_) => Err(CredParseError::config(format!(
                "Records and parse failures would both be written to {}",
                path.display()
            ))),
            None => {
                let sink: Arc<Sink> =
                    Arc::new(FileSink::new(path, config.delimiter.as_bytes(), config.mode).into());
                self.files.insert(key, (channel, Arc::clone(&sink)));
                Ok(sink)
            },
        }
    }
}

/// Absolute path with symlinks and `..` resolved as far as the file system
/// allows. A file that does not exist yet is resolved through its parent.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

fn shared(sink: Arc<Sink>, count: usize) -> Vec<Arc<Sink>> {
    vec![sink; count]
}

fn console_sink(config: &ConsoleConfig) -> Arc<Sink> {
    Arc::new(ConsoleSink::new(config.clone()).into())
}

async fn database_sink(config: &DatabaseConfig) -> Result<Arc<Sink>> {
    let backend = PostgresBackend::connect(config).await.map_err(|e| {
        CredParseError::Database(format!(
            "Cannot connect to {}:{}/{}: {e}",
            config.host, config.port, config.database
        ))
    })?;
    let sink = DatabaseSink::new(config, Box::new(backend))?;
    info!(query = %sink.query(), "Database sink ready");
    Ok(Arc::new(sink.into()))
}

fn distinct<'a>(sinks: impl IntoIterator<Item = &'a Arc<Sink>>) -> Vec<Arc<Sink>> {
    let mut unique: Vec<Arc<Sink>> = Vec::new();
    for sink in sinks {
        if !unique.iter().any(|s| Arc::ptr_eq(s, sink)) {
            unique.push(Arc::clone(sink));
        }
    }
    unique
}

/// Attach to every sink, undoing the attachments made so far on failure
async fn hold(sinks: &[Arc<Sink>]) -> Result<()> {
    for (i, sink) in sinks.iter().enumerate() {
        if let Err(e) = sink.attach().await {
            release(&sinks[..i]).await;
            return Err(CredParseError::Sink(format!(
                "Cannot open {}: {e}",
                sink.describe()
            )));
        }
    }
    Ok(())
}

async fn release(sinks: &[Arc<Sink>]) {
    for sink in sinks {
        if let Err(e) = sink.detach().await {
            warn!(sink = %sink.describe(), error = %e, "Failed to close sink");
        }
    }
}

/// Sum stats over distinct sinks
fn total_stats(sinks: &[Arc<Sink>]) -> SinkStats {
    distinct(sinks).iter().fold(SinkStats::default(), |mut total, sink| {
        let stats = sink.stats();
        total.written += stats.written;
        total.dropped += stats.dropped;
        total
    })
}
