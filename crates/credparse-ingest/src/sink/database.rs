//! Database sink
//!
//! Each record becomes one parameterized insert built from a template query.
//! Inserts accumulate in an open transaction and are committed after every
//! insert (autocommit) or once `commit_every` of them are pending.
//!
//! When an insert or commit fails outside autocommit mode the transaction is
//! rolled back and the uncommitted inserts are replayed from a ring of
//! recently submitted records. The replay window is frozen at the moment of
//! failure. A full replay is committed; a replay that fails again is abandoned,
//! its records are counted as dropped and logged, and nothing is raised to the
//! submitting worker.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::{Attachments, SinkCounters, SinkError, SinkStats};
use crate::config::DatabaseConfig;
use crate::record::Entry;

/// The transactional operations the database sink needs from a connection
#[async_trait]
pub trait InsertBackend: Send {
    /// Execute `query` with `values` bound positionally inside the open transaction
    async fn insert(&mut self, query: &str, values: &[String]) -> Result<(), SinkError>;

    async fn commit(&mut self) -> Result<(), SinkError>;

    async fn rollback(&mut self) -> Result<(), SinkError>;

    /// Release the connection
    async fn close(&mut self) -> Result<(), SinkError>;
}

/// When pending inserts are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitPolicy {
    EveryInsert,
    Batch(usize),
    OnClose,
}

struct DatabaseState {
    attachments: Attachments,
    backend: Box<dyn InsertBackend>,
    /// Inserts executed since the last commit
    uncommitted: usize,
    /// Most recent submissions, oldest first
    recent: VecDeque<Vec<String>>,
}

/// Inserts records through an [`InsertBackend`], usually Postgres
pub struct DatabaseSink {
    query: String,
    policy: CommitPolicy,
    window: usize,
    state: Mutex<DatabaseState>,
    counters: SinkCounters,
}

impl DatabaseSink {
    /// Build a sink over an already connected backend
    pub fn new(config: &DatabaseConfig, backend: Box<dyn InsertBackend>) -> crate::Result<Self> {
        let policy = if config.autocommit {
            CommitPolicy::EveryInsert
        } else {
            match config.commit_every {
                Some(n) => CommitPolicy::Batch(n.max(1)),
                None => CommitPolicy::OnClose,
            }
        };
        let window = config.retry_window();

        Ok(Self {
            query: config.insert_query()?,
            policy,
            window,
            state: Mutex::new(DatabaseState {
                attachments: Attachments::default(),
                backend,
                uncommitted: 0,
                recent: VecDeque::with_capacity(window),
            }),
            counters: SinkCounters::default(),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub async fn attach(&self) -> Result<(), SinkError> {
        self.state.lock().await.attachments.attach().map(|_| ())
    }

    pub async fn submit(&self, entry: &Entry) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        state.attachments.ensure_open()?;

        let record = match entry {
            Entry::Record(record) => record,
            Entry::Failure(failure) => {
                warn!(line = failure.line, reason = %failure.reason, "Parse failure not stored in database");
                self.counters.add_dropped(1);
                return Ok(());
            },
        };

        if record.fields.iter().any(|f| f.is_raw()) {
            debug!(line = record.line, "Storing undecodable field with replacement characters");
        }
        let values: Vec<String> = record.texts().into_iter().map(|t| t.into_owned()).collect();

        if state.recent.len() == self.window {
            state.recent.pop_front();
        }
        state.recent.push_back(values.clone());

        match state.backend.insert(&self.query, &values).await {
            Ok(()) => {
                state.uncommitted += 1;
                if self.commit_due(state.uncommitted) {
                    self.commit(&mut state).await;
                }
            },
            Err(e) => {
                warn!(line = record.line, error = %e, "Insert failed");
                let failed = state.uncommitted + 1;
                self.recover(&mut state, failed).await;
            },
        }

        Ok(())
    }

    /// Commits what is pending and releases the connection once the last user detaches
    pub async fn detach(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if !state.attachments.detach()? {
            return Ok(());
        }

        self.commit(&mut state).await;
        state.recent.clear();
        state.backend.close().await
    }

    pub fn stats(&self) -> SinkStats {
        self.counters.snapshot()
    }

    /// Inserts executed but not yet committed
    pub async fn uncommitted(&self) -> usize {
        self.state.lock().await.uncommitted
    }

    fn commit_due(&self, uncommitted: usize) -> bool {
        match self.policy {
            CommitPolicy::EveryInsert => true,
            CommitPolicy::Batch(n) => uncommitted >= n,
            CommitPolicy::OnClose => false,
        }
    }

    async fn commit(&self, state: &mut DatabaseState) {
        let pending = state.uncommitted;
        match state.backend.commit().await {
            Ok(()) => {
                self.counters.add_written(pending as u64);
                state.uncommitted = 0;
                debug!(records = pending, "Committed");
            },
            Err(e) => {
                warn!(records = pending, error = %e, "Commit failed");
                self.recover(state, pending).await;
            },
        }
    }

    /// Roll back and replay the last `failed` submissions.
    async fn recover(&self, state: &mut DatabaseState, failed: usize) {
        if let Err(e) = state.backend.rollback().await {
            warn!(error = %e, "Rollback failed");
        }
        state.uncommitted = 0;

        if failed == 0 {
            return;
        }

        if self.policy == CommitPolicy::EveryInsert {
            error!(records = failed, "Dropping records after failed insert in autocommit mode");
            self.counters.add_dropped(failed as u64);
            return;
        }

        let replayable = failed.min(state.recent.len());
        let lost = failed - replayable;
        if lost > 0 {
            error!(records = lost, "Rolled back records fell outside the retry window");
            self.counters.add_dropped(lost as u64);
        }

        let replay: Vec<Vec<String>> = state
            .recent
            .iter()
            .skip(state.recent.len() - replayable)
            .cloned()
            .collect();

        for (i, values) in replay.iter().enumerate() {
            if let Err(e) = state.backend.insert(&self.query, values).await {
                error!(
                    replayed = i,
                    records = replayable,
                    error = %e,
                    "Retry failed; dropping the retried records"
                );
                self.abandon(state, replayable).await;
                return;
            }
        }

        match state.backend.commit().await {
            Ok(()) => {
                self.counters.add_written(replayable as u64);
                debug!(records = replayable, "Retried records committed");
            },
            Err(e) => {
                error!(records = replayable, error = %e, "Commit after retry failed; dropping the retried records");
                self.abandon(state, replayable).await;
            },
        }
    }

    async fn abandon(&self, state: &mut DatabaseState, records: usize) {
        if let Err(e) = state.backend.rollback().await {
            warn!(error = %e, "Rollback failed");
        }
        self.counters.add_dropped(records as u64);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_COMMIT_EVERY;
    use crate::record::{Field, ParseFailure, Record};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex as StdMutex};

    /// In-memory transactional store with scripted insert failures
    #[derive(Default)]
    struct MockStore {
        committed: Vec<Vec<String>>,
        pending: Vec<Vec<String>>,
        /// 0-based insert call numbers that fail
        fail_calls: HashSet<usize>,
        fail_commits: usize,
        calls: usize,
        rollbacks: usize,
        closed: bool,
    }

    #[derive(Clone, Default)]
    struct MockBackend(Arc<StdMutex<MockStore>>);

    #[async_trait]
    impl InsertBackend for MockBackend {
        async fn insert(&mut self, _query: &str, values: &[String]) -> Result<(), SinkError> {
            let mut store = self.0.lock().unwrap();
            let call = store.calls;
            store.calls += 1;
            if store.fail_calls.contains(&call) {
                return Err(SinkError::Backend(format!("insert {call} failed")));
            }
            store.pending.push(values.to_vec());
            Ok(())
        }

        async fn commit(&mut self) -> Result<(), SinkError> {
            let mut store = self.0.lock().unwrap();
            if store.fail_commits > 0 {
                store.fail_commits -= 1;
                return Err(SinkError::Backend("commit failed".to_string()));
            }
            let pending = std::mem::take(&mut store.pending);
            store.committed.extend(pending);
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), SinkError> {
            let mut store = self.0.lock().unwrap();
            store.pending.clear();
            store.rollbacks += 1;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SinkError> {
            self.0.lock().unwrap().closed = true;
            Ok(())
        }
    }

    fn config(commit_every: Option<usize>, autocommit: bool) -> DatabaseConfig {
        DatabaseConfig {
            database: "leaks".to_string(),
            table: "credentials".to_string(),
            commit_every,
            autocommit,
            ..DatabaseConfig::default()
        }
    }

    fn entry(i: usize) -> Entry {
        Record::new(
            i as u64,
            vec![Field::Text(format!("user{i}")), Field::Text(format!("pass{i}"))],
        )
        .into()
    }

    fn row(i: usize) -> Vec<String> {
        vec![format!("user{i}"), format!("pass{i}")]
    }

    fn sink_with(config: DatabaseConfig, store: MockStore) -> (DatabaseSink, MockBackend) {
        let backend = MockBackend(Arc::new(StdMutex::new(store)));
        let sink = DatabaseSink::new(&config, Box::new(backend.clone())).unwrap();
        (sink, backend)
    }

    #[tokio::test]
    async fn test_batch_commit_threshold() {
        let (sink, backend) = sink_with(config(Some(3), false), MockStore::default());
        sink.attach().await.unwrap();

        for i in 0..4 {
            sink.submit(&entry(i)).await.unwrap();
        }
        assert_eq!(backend.0.lock().unwrap().committed.len(), 3);
        assert_eq!(sink.uncommitted().await, 1);
        assert_eq!(sink.stats().written, 3);

        sink.detach().await.unwrap();
        let store = backend.0.lock().unwrap();
        assert_eq!(store.committed, (0..4).map(row).collect::<Vec<_>>());
        assert!(store.closed);
        assert_eq!(sink.stats().written, 4);
    }

    #[tokio::test]
    async fn test_autocommit_commits_every_insert() {
        let (sink, backend) = sink_with(config(Some(100), true), MockStore::default());
        sink.attach().await.unwrap();

        sink.submit(&entry(0)).await.unwrap();
        assert_eq!(backend.0.lock().unwrap().committed.len(), 1);
        assert_eq!(sink.uncommitted().await, 0);
    }

    #[tokio::test]
    async fn test_failed_insert_replays_uncommitted_window_once() {
        // Third insert fails; the two pending inserts are rolled back with it
        let store = MockStore {
            fail_calls: HashSet::from([2]),
            ..MockStore::default()
        };
        let (sink, backend) = sink_with(config(Some(10), false), store);
        sink.attach().await.unwrap();

        for i in 0..3 {
            sink.submit(&entry(i)).await.unwrap();
        }

        {
            let store = backend.0.lock().unwrap();
            assert_eq!(store.rollbacks, 1);
            assert_eq!(store.committed, (0..3).map(row).collect::<Vec<_>>());
            assert!(store.pending.is_empty());
        }
        assert_eq!(sink.uncommitted().await, 0);
        assert_eq!(sink.stats(), SinkStats { written: 3, dropped: 0 });

        sink.submit(&entry(3)).await.unwrap();
        sink.detach().await.unwrap();

        let store = backend.0.lock().unwrap();
        assert_eq!(store.committed, (0..4).map(row).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failed_replay_drops_window_without_raising() {
        // Insert 1 fails; the replay re-runs rows 0 and 1 as calls 2 and 3, and call 3 fails too
        let store = MockStore {
            fail_calls: HashSet::from([1, 3]),
            ..MockStore::default()
        };
        let (sink, backend) = sink_with(config(Some(10), false), store);
        sink.attach().await.unwrap();

        sink.submit(&entry(0)).await.unwrap();
        sink.submit(&entry(1)).await.unwrap();
        sink.submit(&entry(2)).await.unwrap();
        sink.detach().await.unwrap();

        let store = backend.0.lock().unwrap();
        assert_eq!(store.committed, vec![row(2)]);
        assert_eq!(store.rollbacks, 2);
        assert_eq!(sink.stats(), SinkStats { written: 1, dropped: 2 });
    }

    #[tokio::test]
    async fn test_default_batching_limits_loss_from_a_bad_row() {
        // Row 1499 fails on insert and again as the last call of its replay
        let store = MockStore {
            fail_calls: HashSet::from([1499, 1999]),
            ..MockStore::default()
        };
        let (sink, backend) = sink_with(config(Some(DEFAULT_COMMIT_EVERY), false), store);
        sink.attach().await.unwrap();

        for i in 0..1500 {
            sink.submit(&entry(i)).await.unwrap();
        }
        sink.detach().await.unwrap();

        assert_eq!(backend.0.lock().unwrap().committed.len(), DEFAULT_COMMIT_EVERY);
        assert_eq!(sink.stats(), SinkStats { written: 1000, dropped: 500 });
    }

    #[tokio::test]
    async fn test_autocommit_failure_drops_single_record() {
        let store = MockStore {
            fail_calls: HashSet::from([1]),
            ..MockStore::default()
        };
        let (sink, backend) = sink_with(config(None, true), store);
        sink.attach().await.unwrap();

        for i in 0..3 {
            sink.submit(&entry(i)).await.unwrap();
        }

        let store = backend.0.lock().unwrap();
        assert_eq!(store.committed, vec![row(0), row(2)]);
        assert_eq!(sink.stats(), SinkStats { written: 2, dropped: 1 });
    }

    #[tokio::test]
    async fn test_failed_commit_is_retried() {
        let store = MockStore {
            fail_commits: 1,
            ..MockStore::default()
        };
        let (sink, backend) = sink_with(config(Some(2), false), store);
        sink.attach().await.unwrap();

        sink.submit(&entry(0)).await.unwrap();
        sink.submit(&entry(1)).await.unwrap();

        let store = backend.0.lock().unwrap();
        assert_eq!(store.committed, vec![row(0), row(1)]);
        assert_eq!(sink.stats().written, 2);
    }

    #[tokio::test]
    async fn test_rows_outside_retry_window_are_dropped() {
        // Without batching the window holds 2000 rows; a failure after 2003
        // uncommitted inserts can replay only the newest 2000 of them
        let store = MockStore {
            fail_calls: HashSet::from([2002]),
            ..MockStore::default()
        };
        let (sink, backend) = sink_with(config(None, false), store);
        sink.attach().await.unwrap();

        for i in 0..2003 {
            sink.submit(&entry(i)).await.unwrap();
        }
        sink.detach().await.unwrap();

        let store = backend.0.lock().unwrap();
        assert_eq!(store.committed, (3..2003).map(row).collect::<Vec<_>>());
        assert_eq!(sink.stats(), SinkStats { written: 2000, dropped: 3 });
    }

    #[tokio::test]
    async fn test_parse_failures_are_counted_as_dropped() {
        let (sink, backend) = sink_with(config(Some(10), false), MockStore::default());
        sink.attach().await.unwrap();

        sink.submit(&ParseFailure::no_delimiter(1, b"junk").into())
            .await
            .unwrap();
        sink.detach().await.unwrap();

        assert_eq!(backend.0.lock().unwrap().calls, 0);
        assert_eq!(sink.stats(), SinkStats { written: 0, dropped: 1 });
    }

    #[tokio::test]
    async fn test_closed_after_last_detach() {
        let (sink, backend) = sink_with(config(Some(10), false), MockStore::default());
        sink.attach().await.unwrap();
        sink.attach().await.unwrap();

        sink.submit(&entry(0)).await.unwrap();
        sink.detach().await.unwrap();
        assert!(!backend.0.lock().unwrap().closed);

        sink.detach().await.unwrap();
        assert!(backend.0.lock().unwrap().closed);
        assert!(matches!(sink.submit(&entry(1)).await, Err(SinkError::Closed)));
    }
}
