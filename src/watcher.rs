//! Recursive directory watching.
//!
//! `notify` delivers events on its own thread; they are forwarded into a
//! bounded channel and consumed by [`DirectoryWatcher::run_until`], which
//! filters them through an [`EventFilter`], debounces per path, and hands
//! settled paths to the [`Dispatcher`]. Settled paths queue while every slot
//! is busy; waiting for a slot is one more branch of the loop, so shutdown
//! and new events are still seen.
//!
//! The same filter backs [`scan_paths`], used by one-shot ingestion.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, AcquireError, OwnedSemaphorePermit};
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::debounce::Debouncer;
use crate::dispatch::{Dispatcher, Summary};
use crate::error::WatchError;
use crate::extract;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Decides which paths under a root are ingestion candidates.
pub struct EventFilter {
    root: PathBuf,
    excludes: GlobSet,
}

impl EventFilter {
    pub fn new(root: impl Into<PathBuf>, exclude_globs: &[String]) -> Result<Self, WatchError> {
        Ok(Self {
            root: root.into(),
            excludes: build_globset(exclude_globs)?,
        })
    }

    /// Supported extension and not excluded. Exclude globs match the path
    /// relative to the root.
    pub fn accepts(&self, path: &Path) -> bool {
        if !extract::is_supported(path) {
            return false;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        !self.excludes.is_match(relative)
    }

    /// Candidate paths touched by a create or modify event.
    pub fn changed_paths(&self, event: &Event) -> Vec<PathBuf> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => event
                .paths
                .iter()
                .filter(|p| self.accepts(p))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Paths removed by the event; pending debounce entries for them are stale.
    pub fn removed_paths<'a>(&self, event: &'a Event) -> &'a [PathBuf] {
        match event.kind {
            EventKind::Remove(_) => &event.paths,
            _ => &[],
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, WatchError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Watches a directory tree and feeds settled files to a [`Dispatcher`].
pub struct DirectoryWatcher {
    filter: EventFilter,
    debounce: Duration,
    dispatcher: Dispatcher,
    events: mpsc::Receiver<notify::Result<Event>>,
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Subscribe to `config.dir` recursively.
    pub fn new(config: &WatchConfig, dispatcher: Dispatcher) -> Result<Self, WatchError> {
        if !config.dir.is_dir() {
            return Err(WatchError::NotADirectory(config.dir.clone()));
        }
        let filter = EventFilter::new(&config.dir, &config.exclude_globs)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means we are shutting down.
            let _ = tx.blocking_send(res);
        })?;
        watcher.watch(&config.dir, RecursiveMode::Recursive)?;

        tracing::info!(
            dir = %config.dir.display(),
            concurrency = dispatcher.capacity(),
            debounce_ms = config.debounce_ms,
            "watching for new files"
        );

        Ok(Self {
            filter,
            debounce: config.debounce(),
            dispatcher,
            events: rx,
            _watcher: watcher,
        })
    }

    /// Run until `shutdown` resolves, then wait for in-flight files.
    ///
    /// Paths still inside their debounce window, or settled but waiting for
    /// a slot, at shutdown are not admitted.
    pub async fn run_until<F>(mut self, shutdown: F) -> Summary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut debouncer = Debouncer::new(self.debounce);
        let mut ready: VecDeque<PathBuf> = VecDeque::new();

        loop {
            let wait = debouncer.next_ready_in().unwrap_or_default();
            let has_pending = debouncer.has_pending();
            let has_ready = !ready.is_empty();
            let has_tasks = self.dispatcher.pending() > 0;
            let reservation = self.dispatcher.reserve();

            let step = tokio::select! {
                _ = &mut shutdown => Step::Shutdown,
                event = self.events.recv() => Step::Event(event),
                _ = tokio::time::sleep(wait), if has_pending => Step::Flush,
                permit = reservation, if has_ready => Step::Admit(permit),
                _ = self.dispatcher.join_next(), if has_tasks => Step::Reaped,
            };

            match step {
                Step::Shutdown => break,
                Step::Event(Some(Ok(event))) => {
                    for path in self.filter.removed_paths(&event) {
                        debouncer.remove(path);
                    }
                    for path in self.filter.changed_paths(&event) {
                        tracing::trace!(file = %path.display(), kind = ?event.kind, "change");
                        debouncer.record(path);
                    }
                }
                Step::Event(Some(Err(e))) => {
                    tracing::warn!(error = %e, "watch error");
                }
                Step::Event(None) => {
                    tracing::warn!("watch event channel closed");
                    break;
                }
                Step::Flush => {
                    for path in debouncer.take_ready() {
                        if !ready.contains(&path) {
                            ready.push_back(path);
                        }
                    }
                }
                Step::Admit(Ok(permit)) => {
                    let Some(path) = ready.pop_front() else {
                        continue;
                    };
                    if path.is_file() {
                        self.dispatcher.start(path, permit);
                    } else {
                        tracing::debug!(file = %path.display(), "gone before admission, skipping");
                    }
                }
                Step::Admit(Err(e)) => {
                    tracing::error!(error = %e, queued = ready.len(), "dispatcher closed");
                    break;
                }
                Step::Reaped => {}
            }
        }

        tracing::info!(
            in_flight = self.dispatcher.pending(),
            dropped = debouncer.pending_count() + ready.len(),
            "stopping watcher, draining in-flight files"
        );
        drop(self._watcher);
        let summary = self.dispatcher.drain().await;
        tracing::info!(
            ingested = summary.ingested,
            empty = summary.empty,
            failed = summary.failed,
            chunks = summary.chunks,
            "watcher stopped"
        );
        summary
    }
}

enum Step {
    Shutdown,
    Event(Option<notify::Result<Event>>),
    Flush,
    Admit(Result<OwnedSemaphorePermit, AcquireError>),
    Reaped,
}

/// Expand files and directories into the candidate files beneath them.
///
/// Files named explicitly are kept if their extension is supported, even
/// when an exclude glob would match. Directories are walked recursively and
/// filtered like watch events. Output is sorted and deduplicated.
pub fn scan_paths(paths: &[PathBuf], exclude_globs: &[String]) -> Result<Vec<PathBuf>, WatchError> {
    let mut files = Vec::new();

    for root in paths {
        if root.is_file() {
            if extract::is_supported(root) {
                files.push(root.clone());
            } else {
                tracing::warn!(file = %root.display(), "unsupported file type, skipping");
            }
            continue;
        }
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root.clone()));
        }

        let filter = EventFilter::new(root, exclude_globs)?;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && filter.accepts(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
