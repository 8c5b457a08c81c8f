//! Record sinks
//!
//! A [`Sink`] is the destination for parsed records or parse failures. The set
//! of destinations is closed: console, file, or database.
//!
//! # Lifecycle
//!
//! Every user of a sink calls [`Sink::attach`] once before its first submit
//! and [`Sink::detach`] once after its last. A sink may be shared by many
//! workers; it acquires its resources on the first attach and releases them
//! when the last user detaches. After that the sink is closed for good.
//!
//! Each sink serializes its own writes, so one `submit` never interleaves
//! with another on the same sink.

mod console;
mod database;
mod file;
mod postgres;

pub use console::ConsoleSink;
pub use database::{DatabaseSink, InsertBackend};
pub use file::FileSink;
pub use postgres::PostgresBackend;

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::record::Entry;

/// Errors raised by sinks
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error writing to {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database backend error: {0}")]
    Backend(String),

    #[error("Sink used before attach")]
    NotAttached,

    #[error("Sink is closed")]
    Closed,
}

impl SinkError {
    pub(crate) fn io(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            target: target.into(),
            source,
        }
    }
}

/// Point-in-time sink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Entries durably written (committed, for the database sink)
    pub written: u64,
    /// Entries accepted but lost, e.g. after a failed database retry
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SinkCounters {
    written: AtomicU64,
    dropped: AtomicU64,
}

impl SinkCounters {
    pub(crate) fn add_written(&self, n: u64) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SinkStats {
        SinkStats {
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Attach bookkeeping shared by every sink variant
#[derive(Debug, Default)]
pub(crate) struct Attachments {
    users: usize,
    closed: bool,
}

impl Attachments {
    /// Register a user. Returns true for the first one.
    pub(crate) fn attach(&mut self) -> Result<bool, SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.users += 1;
        Ok(self.users == 1)
    }

    /// Unregister a user. Returns true when the last one leaves and the sink closes.
    pub(crate) fn detach(&mut self) -> Result<bool, SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if self.users == 0 {
            return Err(SinkError::NotAttached);
        }
        self.users -= 1;
        if self.users == 0 {
            self.closed = true;
        }
        Ok(self.closed)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SinkError> {
        if self.closed {
            Err(SinkError::Closed)
        } else if self.users == 0 {
            Err(SinkError::NotAttached)
        } else {
            Ok(())
        }
    }
}

/// A destination for parsed lines
pub enum Sink {
    Console(ConsoleSink),
    File(FileSink),
    Database(DatabaseSink),
}

impl Sink {
    pub async fn attach(&self) -> Result<(), SinkError> {
        match self {
            Sink::Console(sink) => sink.attach().await,
            Sink::File(sink) => sink.attach().await,
            Sink::Database(sink) => sink.attach().await,
        }
    }

    /// Write one entry. Atomic with respect to other submits on this sink.
    pub async fn submit(&self, entry: &Entry) -> Result<(), SinkError> {
        match self {
            Sink::Console(sink) => sink.submit(entry).await,
            Sink::File(sink) => sink.submit(entry).await,
            Sink::Database(sink) => sink.submit(entry).await,
        }
    }

    pub async fn detach(&self) -> Result<(), SinkError> {
        match self {
            Sink::Console(sink) => sink.detach().await,
            Sink::File(sink) => sink.detach().await,
            Sink::Database(sink) => sink.detach().await,
        }
    }

    pub fn stats(&self) -> SinkStats {
        match self {
            Sink::Console(sink) => sink.stats(),
            Sink::File(sink) => sink.stats(),
            Sink::Database(sink) => sink.stats(),
        }
    }

    /// Short human-readable description, e.g. the output file path
    pub fn describe(&self) -> String {
        match self {
            Sink::Console(_) => "console".to_string(),
            Sink::File(sink) => sink.path().display().to_string(),
            Sink::Database(_) => "database".to_string(),
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sink").field(&self.describe()).finish()
    }
}

impl From<ConsoleSink> for Sink {
    fn from(sink: ConsoleSink) -> Self {
        Sink::Console(sink)
    }
}

impl From<FileSink> for Sink {
    fn from(sink: FileSink) -> Self {
        Sink::File(sink)
    }
}

impl From<DatabaseSink> for Sink {
    fn from(sink: DatabaseSink) -> Self {
        Sink::Database(sink)
    }
}
