//! Process-wide holder of the current [`Snapshot`].
//!
//! `publish` swaps the shared Arc under a short write lock; `current` clones
//! the Arc under a read lock. A reader observes either the pre-swap or the
//! post-swap snapshot in its entirety, never a torn state, and a clone held
//! across a publish keeps the old snapshot alive until dropped.

use crate::snapshot::Snapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub struct FileStore {
    current: RwLock<Arc<Snapshot>>,
    ever_updated: AtomicBool,
}

impl FileStore {
    /// Create a store holding the preloaded boot snapshot.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            ever_updated: AtomicBool::new(false),
        }
    }

    /// Atomically replace the current snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        *self.current.write().unwrap() = Arc::new(snapshot);
        self.ever_updated.store(true, Ordering::Release);
    }

    /// The currently published snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap())
    }

    /// Whether any snapshot has been published since boot.
    pub fn was_updated(&self) -> bool {
        self.ever_updated.load(Ordering::Acquire)
    }
}
