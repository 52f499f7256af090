//! Mutual exclusion for one tree and every handle into it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use xml_engine::Tree;

/// The lock domain serializing all access to one tree.
///
/// A document creates one domain at construction and shares it by
/// reference with every attached element; attached elements never carry a
/// domain of their own. A detached element heads its own private tree and
/// owns a private domain alongside it. No operation ever holds two
/// domains at once.
pub(crate) struct LockDomain {
    tree: Mutex<Tree>,
}

impl LockDomain {
    pub(crate) fn new(tree: Tree) -> Self {
        Self {
            tree: Mutex::new(tree),
        }
    }

    /// Acquire the domain, blocking until it is free. Acquisition never
    /// times out. A poisoned lock is recovered: failing operations check
    /// their preconditions before touching the arena, so the tree never
    /// holds a partial mutation.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
