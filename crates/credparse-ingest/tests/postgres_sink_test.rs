//! Database sink against a real Postgres
//!
//! These tests require Docker to be running. Run with:
//!
//! ```bash
//! cargo test -p credparse-ingest --test postgres_sink_test -- --ignored --nocapture
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{init_test_tracing, numbered_lines, write_input, TestPostgres};
use credparse_ingest::config::{ErrorOutputConfig, FileSinkConfig, OutputConfig, RunConfig};
use credparse_ingest::pipeline::Pipeline;
use credparse_ingest::record::{Entry, Field, Record};
use credparse_ingest::sink::{DatabaseSink, PostgresBackend, Sink};
use tempfile::TempDir;

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pipeline_inserts_every_record() {
    init_test_tracing();
    let pg = TestPostgres::start()
        .await
        .expect("Failed to start PostgreSQL container");

    let input_dir = TempDir::new().unwrap();
    let files = vec![
        write_input(input_dir.path(), "a.txt", numbered_lines("a", 1_500).as_bytes()),
        write_input(input_dir.path(), "b.txt", numbered_lines("b", 700).as_bytes()),
    ];

    let mut db = pg.database_config();
    db.commit_every = Some(500);
    let config = RunConfig {
        output: OutputConfig::Database(db),
        errors: ErrorOutputConfig::File(FileSinkConfig {
            suffix: "_errors".to_string(),
            ..FileSinkConfig::default()
        }),
        show_progress: false,
        ..RunConfig::default()
    };

    let summary = Pipeline::new(config).run(&files).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.output.written, 2_200);
    assert_eq!(summary.output.dropped, 0);
    assert_eq!(pg.usernames().await.unwrap().len(), 2_200);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_failed_replay_drops_the_retried_batch() {
    init_test_tracing();
    let pg = TestPostgres::start()
        .await
        .expect("Failed to start PostgreSQL container");

    let mut db = pg.database_config();
    db.commit_every = Some(10);
    let backend = PostgresBackend::connect(&db).await.unwrap();
    let sink: Sink = DatabaseSink::new(&db, Box::new(backend)).unwrap().into();

    let row = |user: &str| -> Entry { Record::new(1, vec![Field::from(user), Field::from("pw")]).into() };

    sink.attach().await.unwrap();
    sink.submit(&row("alice")).await.unwrap();
    sink.submit(&row("bob")).await.unwrap();
    // Duplicate username violates the UNIQUE constraint, aborting the transaction
    sink.submit(&row("alice")).await.unwrap();
    sink.submit(&row("carol")).await.unwrap();
    sink.detach().await.unwrap();

    // The replay hits the same violation, so the whole uncommitted batch is
    // dropped and later records are unaffected
    assert_eq!(pg.usernames().await.unwrap(), vec!["carol"]);
    let stats = sink.stats();
    assert_eq!((stats.written, stats.dropped), (1, 3));
}
