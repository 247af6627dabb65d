//! Registry of open resource sets.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// A resource set that was registered and not yet released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResourceSet {
    /// Id of the resource set.
    pub id: u64,
    /// SQL the resource set was opened for, if known.
    pub sql: Option<String>,
    /// Time since the resource set was opened.
    pub age: Duration,
}

#[derive(Debug)]
struct Entry {
    sql: Option<String>,
    opened_at: Instant,
}

/// Tracks resource sets that are open, so that leaks can be detected at
/// test or shutdown time instead of relying on drop-time diagnostics.
///
/// Cloning a tracker yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    open: Arc<Mutex<HashMap<u64, Entry>>>,
}

impl ResourceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: u64, sql: Option<&str>) {
        let entry = Entry { sql: sql.map(ToOwned::to_owned), opened_at: Instant::now() };
        self.open.lock().insert(id, entry);
    }

    pub(crate) fn deregister(&self, id: u64) {
        self.open.lock().remove(&id);
    }

    /// Number of resource sets currently open.
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Snapshot of the open resource sets, oldest first.
    pub fn open_sets(&self) -> Vec<OpenResourceSet> {
        let now = Instant::now();
        let mut sets: Vec<_> = self
            .open
            .lock()
            .iter()
            .map(|(id, entry)| OpenResourceSet {
                id: *id,
                sql: entry.sql.clone(),
                age: now.saturating_duration_since(entry.opened_at),
            })
            .collect();
        sets.sort_by(|a, b| b.age.cmp(&a.age).then(a.id.cmp(&b.id)));
        sets
    }

    /// Logs a warning for every open resource set and returns how many
    /// there were.
    pub fn report_unreleased(&self) -> usize {
        let sets = self.open_sets();
        for set in &sets {
            tracing::warn!(
                target: "closeable_rows",
                id = set.id,
                sql = set.sql.as_deref().unwrap_or("<unknown>"),
                age_ms = u64::try_from(set.age.as_millis()).unwrap_or(u64::MAX),
                "resource set was not released"
            );
        }
        sets.len()
    }
}
