//! Registry of running workers, read by the progress reporter

use std::sync::{Arc, PoisonError, RwLock};

use crate::worker::WorkerStatus;

/// Every worker created for a run, in registration order
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<Vec<Arc<WorkerStatus>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, status: Arc<WorkerStatus>) {
        self.workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status);
    }

    pub fn all(&self) -> Vec<Arc<WorkerStatus>> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Workers that have not finished yet
    pub fn active(&self) -> Vec<Arc<WorkerStatus>> {
        self.all()
            .into_iter()
            .filter(|status| !status.is_finished())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
