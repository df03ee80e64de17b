//! Registry of live windows
//!
//! Holds weak handles only. Whoever owns an entry keeps it alive; the registry
//! just answers "who is visible right now".

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Thread-safe set of weak handles to live actors
pub struct WindowRegistry<T> {
    entries: Mutex<Vec<Weak<T>>>,
}

impl<T> WindowRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Record a weak handle to `actor`
    pub fn add(&self, actor: &Arc<T>) {
        self.entries.lock().push(Arc::downgrade(actor));
    }

    /// Erase the entry referring to `actor`
    ///
    /// Removing an actor that is not registered is a lookup miss and leaves the
    /// registry untouched. Returns whether an entry was erased.
    pub fn remove(&self, actor: &Arc<T>) -> bool {
        let mut entries = self.entries.lock();
        let position = entries
            .iter()
            .position(|weak| weak.upgrade().is_some_and(|strong| Arc::ptr_eq(&strong, actor)));

        match position {
            Some(index) => {
                entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Resolve every live entry into a strong handle
    ///
    /// Entries whose actor has already been dropped are pruned. The lock is
    /// released before the snapshot is handed back, so callers are free to
    /// block or hop contexts while iterating it.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        let mut entries = self.entries.lock();
        entries.retain(|weak| weak.strong_count() > 0);
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    /// Whether `actor` currently has an entry
    pub fn contains(&self, actor: &Arc<T>) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(actor)))
    }

    /// Number of entries that still resolve
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for WindowRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WindowRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowRegistry")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_snapshot() {
        let registry = WindowRegistry::new();
        let a = Arc::new("a");
        let b = Arc::new("b");

        registry.add(&a);
        registry.add(&b);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|entry| Arc::ptr_eq(entry, &a)));
        assert!(snapshot.iter().any(|entry| Arc::ptr_eq(entry, &b)));
    }

    #[test]
    fn test_remove_only_matching_entry() {
        let registry = WindowRegistry::new();
        let a = Arc::new(1);
        let b = Arc::new(1);

        registry.add(&a);
        registry.add(&b);
        assert!(registry.remove(&a));

        // Equal values, different actors.
        assert!(!registry.contains(&a));
        assert!(registry.contains(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = WindowRegistry::new();
        let a = Arc::new(());
        let stranger = Arc::new(());
        registry.add(&a);

        assert!(!registry.remove(&stranger));
        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_skips_dropped_actors() {
        let registry = WindowRegistry::new();
        let kept = Arc::new(String::from("kept"));
        let dropped = Arc::new(String::from("dropped"));

        registry.add(&kept);
        registry.add(&dropped);
        drop(dropped);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].as_str(), "kept");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_prunes_abandoned_entries() {
        let registry = WindowRegistry::new();
        let kept = Arc::new(1);
        for _ in 0..3 {
            // Never removed, as when an actor's context dies mid-flight.
            let abandoned = Arc::new(0);
            registry.add(&abandoned);
        }
        registry.add(&kept);
        assert_eq!(registry.entries.lock().len(), 4);

        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.entries.lock().len(), 1);
        assert!(registry.contains(&kept));
    }

    #[test]
    fn test_concurrent_add_remove() {
        let registry = Arc::new(WindowRegistry::new());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let actor = Arc::new(i);
                        registry.add(&actor);
                        assert!(registry.contains(&actor));
                        assert!(registry.remove(&actor));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }
}
