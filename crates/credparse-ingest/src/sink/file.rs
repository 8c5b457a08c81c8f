//! File sink

use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Attachments, SinkCounters, SinkError, SinkStats};
use crate::config::FileMode;
use crate::record::Entry;

struct FileState {
    attachments: Attachments,
    writer: Option<BufWriter<tokio::fs::File>>,
}

/// Writes one delimiter-joined line per record to a single output file.
///
/// Parse failures are written as the raw input line, so an error file can be
/// fed back through the parser with different delimiters.
pub struct FileSink {
    path: PathBuf,
    delimiter: Vec<u8>,
    mode: FileMode,
    state: Mutex<FileState>,
    counters: SinkCounters,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, delimiter: impl Into<Vec<u8>>, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            delimiter: delimiter.into(),
            mode,
            state: Mutex::new(FileState {
                attachments: Attachments::default(),
                writer: None,
            }),
            counters: SinkCounters::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file on the first attach
    pub async fn attach(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if !state.attachments.attach()? {
            return Ok(());
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match self.mode {
            FileMode::Append => options.append(true),
            FileMode::Truncate => options.write(true).truncate(true),
        };

        match options.open(&self.path).await {
            Ok(file) => {
                debug!(path = %self.path.display(), mode = ?self.mode, "Opened output file");
                state.writer = Some(BufWriter::new(file));
                Ok(())
            },
            Err(e) => {
                // Leave the sink unattached so the failure is not masked later
                state.attachments = Attachments::default();
                Err(SinkError::io(self.path.display().to_string(), e))
            },
        }
    }

    pub async fn submit(&self, entry: &Entry) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        state.attachments.ensure_open()?;
        let writer = state.writer.as_mut().ok_or(SinkError::NotAttached)?;

        let line = self.encode(entry);
        writer
            .write_all(&line)
            .await
            .map_err(|e| SinkError::io(self.path.display().to_string(), e))?;

        self.counters.add_written(1);
        Ok(())
    }

    /// Flushes and closes the file when the last user detaches
    pub async fn detach(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if !state.attachments.detach()? {
            return Ok(());
        }

        if let Some(mut writer) = state.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| SinkError::io(self.path.display().to_string(), e))?;
            debug!(path = %self.path.display(), "Closed output file");
        }
        Ok(())
    }

    pub fn stats(&self) -> SinkStats {
        self.counters.snapshot()
    }

    fn encode(&self, entry: &Entry) -> Vec<u8> {
        let mut line = match entry {
            Entry::Record(record) => {
                let fields: Vec<&[u8]> = record.fields.iter().map(|f| f.as_bytes()).collect();
                fields.join(self.delimiter.as_slice())
            },
            Entry::Failure(failure) => failure.raw.clone(),
        };
        line.push(b'\n');
        line
    }
}
