//! Credential dump parsing
//!
//! Splits line-oriented dump files (`user:pass`, `mail;hash`, ...) into a
//! fixed number of fields and routes each line to exactly one place: a
//! parsed [`record::Record`] to the output sink, or a
//! [`record::ParseFailure`] to the error sink.
//!
//! # Pipeline
//!
//! - [`delimiter`]: picks which candidate delimiter a line uses
//! - [`split`]: splits a line into exactly N fields
//! - [`decode`]: turns field bytes into text, falling back through encodings
//! - [`sink`]: console, file, or Postgres destinations
//! - [`worker`]: one task per input file, with progress and cancellation
//! - [`registry`] and [`progress`]: live status of every worker
//! - [`pipeline`]: wires a [`config::RunConfig`] into running workers
//!
//! # Example
//!
//! ```no_run
//! use credparse_ingest::config::RunConfig;
//! use credparse_ingest::pipeline::Pipeline;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> credparse_ingest::Result<()> {
//!     let summary = Pipeline::new(RunConfig::default())
//!         .run(&[PathBuf::from("dump.txt")])
//!         .await?;
//!     println!("{} records written", summary.output.written);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod decode;
pub mod delimiter;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod registry;
pub mod sink;
pub mod split;
pub mod worker;

pub use credparse_common::{CredParseError, Result};
