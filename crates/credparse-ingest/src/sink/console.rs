//! Console sink

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{Attachments, SinkCounters, SinkError, SinkStats};
use crate::config::{ConsoleConfig, ConsoleStream};
use crate::record::Entry;

type ConsoleWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct ConsoleState {
    attachments: Attachments,
    writer: ConsoleWriter,
    count: u64,
}

/// Prints one line per entry, e.g. `[Output 12] alice, hunter2`
pub struct ConsoleSink {
    config: ConsoleConfig,
    state: Mutex<ConsoleState>,
    counters: SinkCounters,
}

impl ConsoleSink {
    pub fn new(config: ConsoleConfig) -> Self {
        let writer: ConsoleWriter = match config.stream {
            ConsoleStream::Stdout => Box::new(tokio::io::stdout()),
            ConsoleStream::Stderr => Box::new(tokio::io::stderr()),
        };
        Self::with_writer(config, writer)
    }

    pub fn with_writer(config: ConsoleConfig, writer: ConsoleWriter) -> Self {
        Self {
            config,
            state: Mutex::new(ConsoleState {
                attachments: Attachments::default(),
                writer,
                count: 0,
            }),
            counters: SinkCounters::default(),
        }
    }

    pub async fn attach(&self) -> Result<(), SinkError> {
        self.state.lock().await.attachments.attach().map(|_| ())
    }

    pub async fn submit(&self, entry: &Entry) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        state.attachments.ensure_open()?;

        state.count += 1;
        let line = self.format(state.count, entry);
        state
            .writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SinkError::io(self.target(), e))?;

        self.counters.add_written(1);
        Ok(())
    }

    pub async fn detach(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if state.attachments.detach()? {
            state
                .writer
                .flush()
                .await
                .map_err(|e| SinkError::io(self.target(), e))?;
        }
        Ok(())
    }

    pub fn stats(&self) -> SinkStats {
        self.counters.snapshot()
    }

    fn target(&self) -> &'static str {
        match self.config.stream {
            ConsoleStream::Stdout => "stdout",
            ConsoleStream::Stderr => "stderr",
        }
    }

    fn format(&self, count: u64, entry: &Entry) -> String {
        let mut header = Vec::new();
        if let Some(scope) = &self.config.scope {
            header.push(scope.clone());
        }
        if self.config.show_count {
            header.push(count.to_string());
        }

        let mut line = String::new();
        if !header.is_empty() {
            line.push_str(&format!("[{}] ", header.join(" ")));
        }

        let body = match entry {
            Entry::Record(record) => record.texts().join(self.config.separator.as_str()),
            Entry::Failure(failure) => format!(
                "{}{}{}",
                failure.reason,
                self.config.separator,
                failure.raw_text()
            ),
        };
        line.push_str(&body);
        line.push('\n');
        line
    }
}
