//! Lock-free worklist shared by the workers of one pass

use std::sync::atomic::{AtomicUsize, Ordering};

/// Worklist where each item is claimed by exactly one worker.
///
/// Workers call [`claim()`](WorkQueue::claim) to atomically take the next
/// item together with its position in the original list, so results can be
/// matched back to their input after the pass.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next unclaimed item (lock-free). `None` once the list is drained.
    pub fn claim(&self) -> Option<(usize, &S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|item| (i, item))
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}
