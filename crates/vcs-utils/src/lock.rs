//! Advisory resource locking.
//!
//! Coarse-grained locks over named resources (e.g. `"gc"`), used to
//! serialize maintenance operations. The shipped implementation is
//! in-process only; deployments needing cross-process safety plug in an
//! implementation backed by OS-level advisory file locks.

use std::collections::HashMap;
use std::sync::Mutex;

/// Advisory lock manager over named resources.
pub trait LockManager: Send + Sync {
    /// Try to take the named resource for `owner`. Returns false if some
    /// other owner already holds it. Re-acquisition by the same owner
    /// succeeds.
    fn try_lock(&self, resource: &str, owner: &str) -> bool;

    /// Release the named resource if held by `owner`. Returns true if the
    /// lock was released.
    fn unlock(&self, resource: &str, owner: &str) -> bool;

    /// Forcibly release the named resource regardless of owner.
    /// Intended for stale-lock recovery.
    fn force_unlock(&self, resource: &str) -> bool;

    /// The current owner of the resource, if any.
    fn owner(&self, resource: &str) -> Option<String>;
}

/// In-process lock manager backed by a mutex-guarded map.
#[derive(Default)]
pub struct InProcessLockManager {
    held: Mutex<HashMap<String, String>>,
}

impl InProcessLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockManager for InProcessLockManager {
    fn try_lock(&self, resource: &str, owner: &str) -> bool {
        let mut held = self.held.lock().unwrap();
        match held.get(resource) {
            Some(current) => current == owner,
            None => {
                held.insert(resource.to_string(), owner.to_string());
                true
            }
        }
    }

    fn unlock(&self, resource: &str, owner: &str) -> bool {
        let mut held = self.held.lock().unwrap();
        if held.get(resource).is_some_and(|current| current == owner) {
            held.remove(resource);
            true
        } else {
            false
        }
    }

    fn force_unlock(&self, resource: &str) -> bool {
        self.held.lock().unwrap().remove(resource).is_some()
    }

    fn owner(&self, resource: &str) -> Option<String> {
        self.held.lock().unwrap().get(resource).cloned()
    }
}

/// RAII guard releasing a lock-manager resource on drop.
pub struct LockGuard<'a> {
    manager: &'a dyn LockManager,
    resource: String,
    owner: String,
}

impl<'a> LockGuard<'a> {
    /// Take the resource, returning None if it is held elsewhere.
    pub fn acquire(manager: &'a dyn LockManager, resource: &str, owner: &str) -> Option<Self> {
        if manager.try_lock(resource, owner) {
            Some(Self {
                manager,
                resource: resource.to_string(),
                owner: owner.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.unlock(&self.resource, &self.owner);
    }
}
