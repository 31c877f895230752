//! Bounded-concurrency dispatch of files to a processor.
//!
//! [`Dispatcher::admit`] waits for one of `capacity` semaphore permits and
//! then spawns the file's task, which owns the permit until it ends. Callers
//! that must stay responsive while waiting split this into
//! [`Dispatcher::reserve`] and [`Dispatcher::start`]. The
//! permit is released on drop, so a file that fails or panics still frees
//! its slot. Callers block only while all slots are taken.
//!
//! Task errors are logged with the file path inside the task; panics are
//! logged when the task is reaped. Neither stops the dispatcher.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};

use crate::error::IngestError;
use crate::models::IngestOutcome;
use crate::processor::ProcessFile;

/// Result of one finished task.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<IngestOutcome, IngestError>,
}

/// Running totals over reaped tasks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub ingested: usize,
    pub previewed: usize,
    pub empty: usize,
    pub failed: usize,
    pub chunks: usize,
}

impl Summary {
    pub fn files(&self) -> usize {
        self.ingested + self.previewed + self.empty + self.failed
    }
}

pub struct Dispatcher {
    handler: Arc<dyn ProcessFile>,
    permits: Arc<Semaphore>,
    capacity: usize,
    tasks: JoinSet<FileReport>,
    paths: HashMap<Id, PathBuf>,
    summary: Summary,
}

impl Dispatcher {
    /// `capacity` is clamped to at least 1.
    pub fn new(handler: Arc<dyn ProcessFile>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handler,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: JoinSet::new(),
            paths: HashMap::new(),
            summary: Summary::default(),
        }
    }

    /// Wait for a free slot, then start processing `path` in the background.
    pub async fn admit(&mut self, path: PathBuf) {
        self.reap();

        match self.reserve().await {
            Ok(permit) => self.start(path, permit),
            Err(_) => {
                tracing::error!(file = %path.display(), "dispatcher closed, dropping file");
            }
        }
    }

    /// Future resolving to a free slot. It does not borrow the dispatcher, so
    /// it can be raced against other work and dropped without side effects.
    pub fn reserve(
        &self,
    ) -> impl Future<Output = Result<OwnedSemaphorePermit, AcquireError>> + Send + 'static {
        self.permits.clone().acquire_owned()
    }

    /// Spawn the task for `path` on a slot obtained from [`Dispatcher::reserve`].
    pub fn start(&mut self, path: PathBuf, permit: OwnedSemaphorePermit) {
        self.reap();

        let handler = self.handler.clone();
        let task_path = path.clone();
        let handle = self.tasks.spawn(async move {
            let _permit = permit;
            let path = task_path;
            tracing::info!(file = %path.display(), "new file detected");

            let result = handler.process(&path).await;
            match &result {
                Ok(outcome) => {
                    tracing::debug!(file = %path.display(), ?outcome, "file finished");
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "failed to process file");
                }
            }
            FileReport { path, result }
        });
        self.paths.insert(handle.id(), path);
    }

    /// Record every task that has already finished, without waiting.
    pub fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.record(joined);
        }
    }

    /// Wait for the next task to finish. Returns `None` when idle.
    pub async fn join_next(&mut self) -> Option<()> {
        let joined = self.tasks.join_next_with_id().await?;
        self.record(joined);
        Some(())
    }

    /// Wait for every in-flight task and return the final totals.
    pub async fn drain(&mut self) -> Summary {
        while self.join_next().await.is_some() {}
        self.summary
    }

    /// Tasks currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Tasks spawned but not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    fn record(&mut self, joined: Result<(Id, FileReport), JoinError>) {
        match joined {
            Ok((id, report)) => {
                self.paths.remove(&id);
                match report.result {
                    Ok(IngestOutcome::Ingested { chunks }) => {
                        self.summary.ingested += 1;
                        self.summary.chunks += chunks;
                    }
                    Ok(IngestOutcome::Previewed { chunks }) => {
                        self.summary.previewed += 1;
                        self.summary.chunks += chunks;
                    }
                    Ok(IngestOutcome::Empty) => self.summary.empty += 1,
                    Err(_) => self.summary.failed += 1,
                }
            }
            Err(e) => {
                let path = self.paths.remove(&e.id()).unwrap_or_default();
                if e.is_panic() {
                    tracing::error!(file = %path.display(), "processing task panicked");
                } else {
                    tracing::error!(file = %path.display(), error = %e, "processing task aborted");
                }
                self.summary.failed += 1;
            }
        }
    }
}
