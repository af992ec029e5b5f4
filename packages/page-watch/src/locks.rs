//! Per-label mutual exclusion.
//!
//! At most one pipeline per label is in flight. Sweeps use
//! [`LabelLocks::try_acquire`] and skip busy labels; registry commands use
//! [`LabelLocks::acquire`] and wait.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct LabelLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held for the duration of one pipeline. Released on drop.
#[derive(Debug)]
pub struct LabelGuard {
    label: String,
    _guard: OwnedMutexGuard<()>,
}

impl LabelGuard {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl LabelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, label: &str) -> Arc<Mutex<()>> {
        self.locks.entry(label.to_string()).or_default().clone()
    }

    /// Take the lock for `label` if nobody holds it.
    pub fn try_acquire(&self, label: &str) -> Option<LabelGuard> {
        let guard = self.lock_for(label).try_lock_owned().ok()?;
        Some(LabelGuard {
            label: label.to_string(),
            _guard: guard,
        })
    }

    /// Wait for the lock for `label`.
    pub async fn acquire(&self, label: &str) -> LabelGuard {
        let guard = self.lock_for(label).lock_owned().await;
        LabelGuard {
            label: label.to_string(),
            _guard: guard,
        }
    }

    /// Release `guard` and drop the label's entry, unless someone else is
    /// already waiting on it. Used once a label leaves the registry.
    pub fn release(&self, guard: LabelGuard) {
        let LabelGuard {
            label,
            _guard: held,
        } = guard;
        // One reference in the map, one in the guard.
        self.locks
            .remove_if(&label, |_, lock| Arc::strong_count(lock) <= 2);
        drop(held);
    }

    pub fn is_held(&self, label: &str) -> bool {
        self.locks
            .get(label)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_try_acquire_fails_while_held() {
        let locks = LabelLocks::new();

        let guard = locks.try_acquire("home").expect("first acquire");
        assert!(locks.try_acquire("home").is_none());
        assert!(locks.is_held("home"));

        // Other labels are independent.
        assert!(locks.try_acquire("shop").is_some());

        drop(guard);
        assert!(locks.try_acquire("home").is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let locks = Arc::new(LabelLocks::new());
        let guard = locks.try_acquire("home").unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("home").await.label().to_string() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), "home");
    }

    #[tokio::test]
    async fn release_forgets_idle_labels() {
        let locks = LabelLocks::new();
        let guard = locks.try_acquire("home").unwrap();

        locks.release(guard);

        assert!(locks.locks.get("home").is_none());
        assert!(locks.try_acquire("home").is_some());
    }

    #[tokio::test]
    async fn release_keeps_entry_while_someone_waits() {
        let locks = Arc::new(LabelLocks::new());
        let guard = locks.try_acquire("home").unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire("home").await;
                // Still the same mutex: nobody else can get in.
                assert!(locks.try_acquire("home").is_none());
                drop(guard);
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        locks.release(guard);
        waiter.await.unwrap();
    }
}
