//! Utility helpers shared across the workspace.

/// Creation-cycle bookkeeping
pub mod dependency {
    use parking_lot::RwLock;
    use std::collections::HashSet;

    /// Tracks identities currently being created so that re-entrant creation
    /// (a creation cycle) can be detected and skipped instead of recursing.
    ///
    /// Thread-safe; the set only holds identities for the duration of their
    /// creation.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: RwLock<HashSet<String>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self {
                creating: RwLock::new(HashSet::new()),
            }
        }

        /// Checks whether an identity is currently being created.
        pub fn is_creating(&self, name: &str) -> bool {
            self.creating.read().contains(name)
        }

        /// Marks an identity as being created.
        ///
        /// Returns `false` if it was already in the creating set, which
        /// signals a creation cycle to the caller.
        pub fn start_creating(&self, name: &str) -> bool {
            self.creating.write().insert(name.to_string())
        }

        /// Marks an identity as finished being created.
        pub fn finish_creating(&self, name: &str) {
            self.creating.write().remove(name);
        }

        /// Snapshot of everything currently being created, for diagnostics.
        pub fn current_creating(&self) -> Vec<String> {
            self.creating.read().iter().cloned().collect()
        }
    }
}
