//! Run configuration
//!
//! The structured configuration the pipeline consumes. The CLI assembles it
//! from flags and environment; tests build it directly.

use credparse_common::{CredParseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::decode::TextDecoder;
use crate::delimiter::ResolveStrategy;

// ============================================================================
// Defaults
// ============================================================================

/// Candidate delimiters tried when none are configured.
pub const DEFAULT_DELIMITERS: [&str; 2] = [":", ";"];

/// Default number of fields per record.
pub const DEFAULT_FIELD_COUNT: usize = 2;

/// Default encodings, tried in order.
pub const DEFAULT_ENCODINGS: [&str; 2] = ["utf-8", "windows-1252"];

/// Suffix appended to the input file stem for file output.
pub const DEFAULT_FILE_SUFFIX: &str = "_parsed";

/// Suffix appended to the input file stem for file error output.
pub const DEFAULT_ERROR_SUFFIX: &str = "_errors";

/// Field separator used in output files.
pub const DEFAULT_OUTPUT_DELIMITER: &str = "\t";

/// Default database host.
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default database port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default destination columns.
pub const DEFAULT_DB_FIELDS: [&str; 2] = ["username", "password"];

/// Default number of uncommitted inserts before a commit is forced.
pub const DEFAULT_COMMIT_EVERY: usize = 1000;

/// Retry window used when inserts are never committed in batches.
pub const UNBATCHED_RETRY_WINDOW: usize = 2000;

/// Default database connect timeout in seconds.
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default progress refresh interval in milliseconds.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;

/// Decode a delimiter given on the command line.
///
/// Supports `\t`, `\n`, `\r`, `\\`, `\0` and `\xHH`; everything else is taken literally.
pub fn unescape_delimiter(input: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();

    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        match bytes.next() {
            Some(b't') => out.push(b'\t'),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'x') => {
                let hex: Vec<u8> = bytes.by_ref().take(2).collect();
                let value = std::str::from_utf8(&hex)
                    .ok()
                    .filter(|h| h.len() == 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        CredParseError::config(format!("Invalid \\x escape in delimiter '{input}'"))
                    })?;
                out.push(value);
            },
            Some(other) => {
                out.push(b'\\');
                out.push(other);
            },
            None => out.push(b'\\'),
        }
    }

    Ok(out)
}

// ============================================================================
// Parsing
// ============================================================================

/// How lines are split into records. Shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Candidate delimiters in priority order
    pub delimiters: Vec<Vec<u8>>,
    pub strategy: ResolveStrategy,
    /// Number of fields per record
    pub field_count: usize,
    pub decoder: TextDecoder,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            delimiters: DEFAULT_DELIMITERS
                .iter()
                .map(|d| d.as_bytes().to_vec())
                .collect(),
            strategy: ResolveStrategy::default(),
            field_count: DEFAULT_FIELD_COUNT,
            decoder: TextDecoder::default(),
        }
    }
}

impl ParseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.field_count < 2 {
            return Err(CredParseError::config(format!(
                "Field count must be at least 2, got {}",
                self.field_count
            )));
        }

        if self.delimiters.is_empty() {
            return Err(CredParseError::config("At least one delimiter is required"));
        }

        if self.delimiters.iter().any(Vec::is_empty) {
            return Err(CredParseError::config("Delimiters cannot be empty"));
        }

        if self.decoder.encodings().is_empty() {
            return Err(CredParseError::config("At least one encoding is required"));
        }

        Ok(())
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Which standard stream a console sink writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

/// Console sink formatting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Label shown in the line header, e.g. `[Output 12]`
    pub scope: Option<String>,
    /// Whether the header includes the running count
    pub show_count: bool,
    /// Separator placed between fields
    pub separator: String,
    pub stream: ConsoleStream,
}

impl ConsoleConfig {
    /// Console output for parsed records
    pub fn output() -> Self {
        Self {
            scope: Some("Output".to_string()),
            show_count: true,
            separator: ", ".to_string(),
            stream: ConsoleStream::Stdout,
        }
    }

    /// Console output for parse failures
    pub fn errors() -> Self {
        Self {
            scope: Some("Error".to_string()),
            stream: ConsoleStream::Stderr,
            ..Self::output()
        }
    }
}

/// Whether file output replaces or extends existing files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    #[default]
    Truncate,
    Append,
}

/// File sink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSinkConfig {
    /// Inserted between the input stem and its extension
    pub suffix: String,
    /// Separator placed between fields
    pub delimiter: String,
    pub mode: FileMode,
    /// Directory for output files; defaults to the input file's directory
    pub output_dir: Option<PathBuf>,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_FILE_SUFFIX.to_string(),
            delimiter: DEFAULT_OUTPUT_DELIMITER.to_string(),
            mode: FileMode::Truncate,
            output_dir: None,
        }
    }
}

impl FileSinkConfig {
    /// Output file for `input`: `<stem><suffix><ext>`
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match input.extension() {
            Some(ext) => format!("{stem}{}.{}", self.suffix, ext.to_string_lossy()),
            None => format!("{stem}{}", self.suffix),
        };

        let dir = match &self.output_dir {
            Some(dir) => dir.clone(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        dir.join(name)
    }
}

/// Postgres sink settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub table: String,
    /// Destination columns, one per record field
    pub fields: Vec<String>,
    /// Optional Postgres type cast per column, e.g. `text`
    pub field_types: Option<Vec<String>>,
    /// Commit after this many uncommitted inserts; `None` commits only when the run ends
    pub commit_every: Option<usize>,
    /// Commit after every insert
    pub autocommit: bool,
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("field_types", &self.field_types)
            .field("commit_every", &self.commit_every)
            .field("autocommit", &self.autocommit)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            table: String::new(),
            fields: DEFAULT_DB_FIELDS.iter().map(|f| f.to_string()).collect(),
            field_types: None,
            commit_every: Some(DEFAULT_COMMIT_EVERY),
            autocommit: false,
            connect_timeout_secs: DEFAULT_DB_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    /// Render `INSERT INTO {table} ({fields}) VALUES ({placeholders})`
    pub fn insert_query(&self) -> Result<String> {
        validate_identifier(&self.table)?;
        for field in &self.fields {
            validate_identifier(field)?;
        }

        let placeholders = (1..=self.fields.len())
            .map(|i| match self.field_types.as_ref().and_then(|t| t.get(i - 1)) {
                Some(ty) => format!("${i}::{ty}"),
                None => format!("${i}"),
            })
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.fields.join(", "),
            placeholders
        ))
    }

    /// Number of recent inserts kept for replay after a failed write
    pub fn retry_window(&self) -> usize {
        match self.commit_every {
            Some(n) if !self.autocommit => n.saturating_mul(2),
            _ => UNBATCHED_RETRY_WINDOW,
        }
    }

    pub fn validate(&self, field_count: usize) -> Result<()> {
        if self.database.is_empty() {
            return Err(CredParseError::config("Database name is required"));
        }
        if self.table.is_empty() {
            return Err(CredParseError::config("Table name is required"));
        }
        if self.fields.len() != field_count {
            return Err(CredParseError::config(format!(
                "{} database fields configured but records have {} fields",
                self.fields.len(),
                field_count
            )));
        }
        if let Some(types) = &self.field_types {
            if types.len() != self.fields.len() {
                return Err(CredParseError::config(format!(
                    "{} field types given for {} fields",
                    types.len(),
                    self.fields.len()
                )));
            }
            for ty in types {
                validate_identifier(ty)?;
            }
        }
        if self.commit_every == Some(0) {
            return Err(CredParseError::config("Commit frequency must be at least 1"));
        }
        self.insert_query().map(|_| ())
    }
}

fn validate_identifier(ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        Ok(())
    } else {
        Err(CredParseError::config(format!("Invalid SQL identifier: '{ident}'")))
    }
}

/// Where parsed records go
#[derive(Debug, Clone)]
pub enum OutputConfig {
    Console(ConsoleConfig),
    /// One output file per input file
    File(FileSinkConfig),
    /// One connection shared by every worker
    Database(DatabaseConfig),
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig::Console(ConsoleConfig::output())
    }
}

/// Where parse failures go
#[derive(Debug, Clone)]
pub enum ErrorOutputConfig {
    Console(ConsoleConfig),
    /// One error file per input file
    File(FileSinkConfig),
}

impl Default for ErrorOutputConfig {
    fn default() -> Self {
        ErrorOutputConfig::Console(ConsoleConfig::errors())
    }
}

/// Everything a parse run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub parse: ParseConfig,
    pub output: OutputConfig,
    pub errors: ErrorOutputConfig,
    /// How often the progress line is redrawn
    pub refresh_interval: Duration,
    pub show_progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parse: ParseConfig::default(),
            output: OutputConfig::default(),
            errors: ErrorOutputConfig::default(),
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            show_progress: true,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        self.parse.validate()?;

        if let OutputConfig::Database(db) = &self.output {
            db.validate(self.parse.field_count)?;
        }

        if self.refresh_interval.is_zero() {
            return Err(CredParseError::config("Refresh interval must be positive"));
        }

        Ok(())
    }
}
