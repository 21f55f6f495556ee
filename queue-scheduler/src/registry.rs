//! Process-wide scheduler state (spec.md §9): a registry of every queue
//! scheduler running in this process, and a force-start list admins can
//! push entry ids onto to have them retried out of band on the next loop
//! tick, independent of `next_try`.
//!
//! Shaped after `hook-common::health::HealthRegistry`'s guarded map, but
//! synchronous (`std::sync::Mutex`) since nothing here awaits while holding
//! the lock.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::Notify;

/// A signal channel coalesced the way `tokio::sync::Notify` coalesces
/// multiple `notify_one` calls into a single wakeup: many `force_start`
/// calls between two poll ticks only wake the scheduler loop once.
pub struct QueueHandle {
    pub name: String,
    pub wake: Arc<Notify>,
    forced: Arc<Mutex<HashSet<i64>>>,
}

impl QueueHandle {
    pub fn force_start(&self, entry_id: i64) {
        self.forced.lock().expect("forced set poisoned").insert(entry_id);
        self.wake.notify_one();
    }

    /// Drain and return every entry id force-started since the last call.
    pub fn take_forced(&self) -> HashSet<i64> {
        std::mem::take(&mut *self.forced.lock().expect("forced set poisoned"))
    }
}

static MODULES: OnceLock<Mutex<Vec<Arc<QueueHandle>>>> = OnceLock::new();

/// Register a new running queue scheduler in the process-wide registry and
/// return its handle. Called once per queue at startup.
pub fn register(name: impl Into<String>) -> Arc<QueueHandle> {
    let handle = Arc::new(QueueHandle {
        name: name.into(),
        wake: Arc::new(Notify::new()),
        forced: Arc::new(Mutex::new(HashSet::new())),
    });

    MODULES
        .get_or_init(Default::default)
        .lock()
        .expect("module registry poisoned")
        .push(handle.clone());

    handle
}

/// Look up a running queue's handle by name, used by the admin surface to
/// force-start an entry without going through the database.
pub fn lookup(name: &str) -> Option<Arc<QueueHandle>> {
    MODULES
        .get_or_init(Default::default)
        .lock()
        .expect("module registry poisoned")
        .iter()
        .find(|m| m.name == name)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_start_coalesces_into_one_set() {
        let handle = register("test-queue-registry-coalesce");
        handle.force_start(1);
        handle.force_start(2);
        handle.force_start(1);

        let forced = handle.take_forced();
        assert_eq!(forced.len(), 2);
        assert!(handle.take_forced().is_empty());
    }

    #[test]
    fn lookup_finds_registered_queue() {
        let handle = register("test-queue-registry-lookup");
        let found = lookup("test-queue-registry-lookup").unwrap();
        assert!(Arc::ptr_eq(&handle, &found));
        assert!(lookup("does-not-exist").is_none());
    }
}
