//! CredParse CLI Library
//!
//! Command-line front end for the credential dump parser.
//!
//! - **Parsing**: candidate delimiters, resolution mode, field count, encodings
//! - **Output**: console, one file per input, or a Postgres table
//! - **Errors**: unparseable lines to the console or one file per input
//! - **Progress**: live status line and a per-file summary

pub mod error;
pub mod summary;

pub use error::{CliError, Result};

use clap::{ArgAction, Args, Parser, ValueEnum};
use credparse_ingest::config::{
    unescape_delimiter, ConsoleConfig, DatabaseConfig, ErrorOutputConfig, FileMode,
    FileSinkConfig, OutputConfig, ParseConfig, RunConfig, DEFAULT_COMMIT_EVERY,
    DEFAULT_DB_CONNECT_TIMEOUT_SECS, DEFAULT_DB_HOST, DEFAULT_DB_PORT, DEFAULT_ERROR_SUFFIX,
    DEFAULT_FIELD_COUNT, DEFAULT_FILE_SUFFIX,
};
use credparse_ingest::decode::TextDecoder;
use credparse_ingest::delimiter::ResolveStrategy;
use std::path::PathBuf;
use std::time::Duration;

/// CredParse - split credential dumps into fields
#[derive(Parser, Debug)]
#[command(name = "credparse")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Input files, processed concurrently
    #[arg(required_unless_present = "markdown_help", value_name = "FILE")]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub parse: ParseArgs,

    /// Where parsed records go
    #[arg(short, long, value_enum, default_value_t = OutputMode::Console)]
    pub output: OutputMode,

    #[command(flatten)]
    pub file: FileArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Where unparseable lines go
    #[arg(long, value_enum, default_value_t = ErrorMode::Console)]
    pub errors: ErrorMode,

    /// Suffix for error files
    #[arg(long, default_value = DEFAULT_ERROR_SUFFIX)]
    pub error_suffix: String,

    /// Seconds between progress updates
    #[arg(long, value_name = "SECS", default_value_t = 1.0)]
    pub refresh: f64,

    /// Disable the progress line
    #[arg(long)]
    pub no_progress: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the CLI reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Line splitting options
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Candidate delimiters in priority order; supports \t, \\ and \xHH escapes
    #[arg(
        short = 's',
        long = "delimiters",
        value_name = "DELIM",
        num_args = 1..,
        default_values_t = [":".to_string(), ";".to_string()]
    )]
    pub delimiters: Vec<String>,

    /// How to choose among candidate delimiters present in a line
    #[arg(short, long, value_parser = parse_strategy, default_value = "first-found")]
    pub mode: ResolveStrategy,

    /// Number of fields per record; extra splits stay in the last field
    #[arg(short = 'n', long = "num-fields", default_value_t = DEFAULT_FIELD_COUNT)]
    pub num_fields: usize,

    /// Encodings tried in order when decoding fields
    #[arg(
        long,
        value_name = "LABEL",
        num_args = 1..,
        default_values_t = ["utf-8".to_string(), "windows-1252".to_string()]
    )]
    pub encodings: Vec<String>,
}

/// File output options
#[derive(Args, Debug)]
pub struct FileArgs {
    /// Suffix added to each input's stem for its output file
    #[arg(long, default_value = DEFAULT_FILE_SUFFIX)]
    pub suffix: String,

    /// Separator written between fields
    #[arg(long, value_name = "DELIM", default_value = "\\t")]
    pub out_delimiter: String,

    /// Append to existing output files instead of truncating them
    #[arg(long)]
    pub append: bool,

    /// Directory for output and error files; defaults to each input's directory
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

/// Database output options
#[derive(Args, Debug)]
pub struct DatabaseArgs {
    /// Database name
    #[arg(short = 'd', long = "db", env = "CREDPARSE_DB_NAME")]
    pub db: Option<String>,

    /// Destination table
    #[arg(short, long, env = "CREDPARSE_DB_TABLE")]
    pub table: Option<String>,

    #[arg(short, long, env = "CREDPARSE_DB_USER", default_value = "postgres")]
    pub username: String,

    #[arg(short, long, env = "CREDPARSE_DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    #[arg(long, env = "CREDPARSE_DB_HOST", default_value = DEFAULT_DB_HOST)]
    pub host: String,

    #[arg(long, env = "CREDPARSE_DB_PORT", default_value_t = DEFAULT_DB_PORT)]
    pub port: u16,

    /// Destination columns, one per field
    #[arg(
        short,
        long,
        num_args = 1..,
        default_values_t = ["username".to_string(), "password".to_string()]
    )]
    pub fields: Vec<String>,

    /// Postgres type cast per column, e.g. text
    #[arg(long, num_args = 1..)]
    pub field_types: Option<Vec<String>>,

    /// Commit after this many inserts
    #[arg(long, value_name = "N", default_value_t = DEFAULT_COMMIT_EVERY)]
    pub commit_every: usize,

    /// Keep one transaction open and commit only when all files are done
    #[arg(long, conflicts_with = "autocommit")]
    pub commit_on_close: bool,

    /// Commit every insert
    #[arg(long)]
    pub autocommit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Console,
    File,
    Database,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ErrorMode {
    Console,
    File,
}

fn parse_strategy(value: &str) -> std::result::Result<ResolveStrategy, String> {
    value.parse()
}

impl Cli {
    /// Build and validate the run configuration
    pub fn to_run_config(&self) -> Result<RunConfig> {
        let delimiters = self
            .parse
            .delimiters
            .iter()
            .map(|d| unescape_delimiter(d))
            .collect::<credparse_ingest::Result<Vec<_>>>()?;

        let decoder = TextDecoder::from_labels(&self.parse.encodings).map_err(CliError::config)?;

        let parse = ParseConfig {
            delimiters,
            strategy: self.parse.mode,
            field_count: self.parse.num_fields,
            decoder,
        };

        let output = match self.output {
            OutputMode::Console => OutputConfig::Console(ConsoleConfig::output()),
            OutputMode::File => OutputConfig::File(self.file_sink(&self.file.suffix)?),
            OutputMode::Database => OutputConfig::Database(self.database_config()?),
        };

        let errors = match self.errors {
            ErrorMode::Console => ErrorOutputConfig::Console(ConsoleConfig::errors()),
            ErrorMode::File => ErrorOutputConfig::File(self.file_sink(&self.error_suffix)?),
        };

        let refresh_interval = Duration::try_from_secs_f64(self.refresh)
            .ok()
            .filter(|interval| !interval.is_zero())
            .ok_or_else(|| {
                CliError::config(format!(
                    "--refresh must be a positive number of seconds, got {}",
                    self.refresh
                ))
            })?;

        let config = RunConfig {
            parse,
            output,
            errors,
            refresh_interval,
            show_progress: !self.no_progress,
        };
        config.validate()?;
        Ok(config)
    }

    fn file_sink(&self, suffix: &str) -> Result<FileSinkConfig> {
        let delimiter = String::from_utf8(unescape_delimiter(&self.file.out_delimiter)?)
            .map_err(|_| CliError::config("--out-delimiter must be valid UTF-8"))?;

        Ok(FileSinkConfig {
            suffix: suffix.to_string(),
            delimiter,
            mode: if self.file.append {
                FileMode::Append
            } else {
                FileMode::Truncate
            },
            output_dir: self.file.output_dir.clone(),
        })
    }

    fn database_config(&self) -> Result<DatabaseConfig> {
        let db = &self.database;
        let database = db
            .db
            .clone()
            .ok_or_else(|| CliError::config("--db is required for database output"))?;
        let table = db
            .table
            .clone()
            .ok_or_else(|| CliError::config("--table is required for database output"))?;

        Ok(DatabaseConfig {
            host: db.host.clone(),
            port: db.port,
            username: db.username.clone(),
            password: db.password.clone(),
            database,
            table,
            fields: db.fields.clone(),
            field_types: db.field_types.clone(),
            commit_every: (!db.commit_on_close).then_some(db.commit_every),
            autocommit: db.autocommit,
            connect_timeout_secs: DEFAULT_DB_CONNECT_TIMEOUT_SECS,
        })
    }
}
