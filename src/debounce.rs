//! Per-path debouncing of file change events.
//!
//! Editors and copy tools often fire several create/modify events for one
//! logical write. Each event resets the path's quiet-period timer; a path is
//! released only once it has been quiet for the full window, so a burst of
//! events yields one admission.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    /// path -> time of the most recent event.
    pending: HashMap<PathBuf, Instant>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Record an event for `path`, restarting its quiet period.
    pub fn record(&mut self, path: PathBuf) {
        self.record_at(path, Instant::now());
    }

    fn record_at(&mut self, path: PathBuf, at: Instant) {
        self.pending.insert(path, at);
    }

    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Remove and return every path that has been quiet for the window,
    /// oldest first.
    pub fn take_ready(&mut self) -> Vec<PathBuf> {
        self.take_ready_at(Instant::now())
    }

    fn take_ready_at(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready = Vec::new();

        self.pending.retain(|path, last| {
            if now.duration_since(*last) >= self.window {
                ready.push((*last, path.clone()));
                false
            } else {
                true
            }
        });

        ready.sort();
        ready.into_iter().map(|(_, path)| path).collect()
    }

    /// Time until the earliest pending path becomes ready.
    pub fn next_ready_in(&self) -> Option<Duration> {
        let now = Instant::now();
        self.pending
            .values()
            .map(|last| (*last + self.window).saturating_duration_since(now))
            .min()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
