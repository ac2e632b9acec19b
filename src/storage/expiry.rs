//! One-shot expiry timers for transient values
//!
//! Each scheduled expiry is a tokio task tagged with a generation number.
//! Overwriting, removing or cancelling a key aborts its task and forgets
//! the generation; a task that still fires deletes the key only if its
//! generation is the one registered, so a stale timer can never delete a
//! value written after it was superseded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{VaultError, VaultResult};

use super::store::KeyValueStore;

struct Pending {
    generation: u64,
    handle: AbortHandle,
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;

#[derive(Default)]
pub struct ExpiryTimers {
    pending: PendingMap,
    next_generation: AtomicU64,
}

impl ExpiryTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete `key` from `store` once `ttl` has elapsed
    ///
    /// Replaces any expiry already pending for the key.
    pub fn schedule(
        &self,
        runtime: &Handle,
        store: Arc<dyn KeyValueStore>,
        key: &str,
        ttl: Duration,
    ) -> VaultResult<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        // held across spawn so the task cannot observe the map before insert
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| VaultError::lock_poisoned("expiry timers"))?;

        let task = {
            let pending_map = Arc::clone(&self.pending);
            let key = key.to_string();
            runtime.spawn(async move {
                tokio::time::sleep(ttl).await;
                expire(&pending_map, store.as_ref(), &key, generation);
            })
        };

        let previous = pending.insert(
            key.to_string(),
            Pending {
                generation,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }

        tracing::debug!(key, ttl_ms = ttl.as_millis() as u64, generation, "expiry scheduled");
        Ok(())
    }

    /// Cancel a pending expiry; returns whether one was pending
    pub fn cancel(&self, key: &str) -> bool {
        match self.pending.lock() {
            Ok(mut pending) => match pending.remove(key) {
                Some(entry) => {
                    entry.handle.abort();
                    true
                }
                None => false,
            },
            Err(_) => {
                tracing::warn!(key, "expiry timer lock poisoned, cannot cancel");
                false
            }
        }
    }

    pub fn cancel_all(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            for (_, entry) in pending.drain() {
                entry.handle.abort();
            }
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.contains_key(key))
            .unwrap_or(false)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn expire(
    pending: &Mutex<HashMap<String, Pending>>,
    store: &dyn KeyValueStore,
    key: &str,
    generation: u64,
) {
    let mut pending = match pending.lock() {
        Ok(guard) => guard,
        Err(_) => {
            tracing::warn!(key, "expiry timer lock poisoned, value left in place");
            return;
        }
    };

    match pending.get(key) {
        Some(entry) if entry.generation == generation => {
            pending.remove(key);
        }
        _ => return,
    }

    // removal happens under the lock so a concurrent overwrite waits for it
    match store.remove(key) {
        Ok(()) => tracing::debug!(key, generation, "transient value expired"),
        Err(e) => tracing::warn!(key, error = %e, "failed to remove expired value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store_with(key: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set(key, "v").unwrap();
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_removed_after_ttl() {
        let store = store_with("otp");
        let timers = ExpiryTimers::new();

        timers
            .schedule(&Handle::current(), store.clone(), "otp", Duration::from_secs(30))
            .unwrap();
        assert!(timers.is_pending("otp"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(store.get("otp").unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.get("otp").unwrap().is_none());
        assert!(!timers.is_pending("otp"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_value() {
        let store = store_with("otp");
        let timers = ExpiryTimers::new();

        timers
            .schedule(&Handle::current(), store.clone(), "otp", Duration::from_secs(5))
            .unwrap();
        assert!(timers.cancel("otp"));
        assert!(!timers.cancel("otp"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.get("otp").unwrap().as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_supersedes_previous_timer() {
        let store = store_with("otp");
        let timers = ExpiryTimers::new();
        let handle = Handle::current();

        timers.schedule(&handle, store.clone(), "otp", Duration::from_secs(5)).unwrap();
        timers.schedule(&handle, store.clone(), "otp", Duration::from_secs(60)).unwrap();
        assert_eq!(timers.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.get("otp").unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(store.get("otp").unwrap().is_none());
    }

    #[test]
    fn test_stale_generation_does_not_delete() {
        let store = store_with("otp");
        let pending: Mutex<HashMap<String, Pending>> = Mutex::new(HashMap::new());

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let handle = runtime.spawn(async {}).abort_handle();
        pending.lock().unwrap().insert(
            "otp".into(),
            Pending {
                generation: 2,
                handle,
            },
        );

        expire(&pending, store.as_ref(), "otp", 1);
        assert!(store.get("otp").unwrap().is_some());

        expire(&pending, store.as_ref(), "otp", 2);
        assert!(store.get("otp").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let store = Arc::new(MemoryStore::new());
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        let timers = ExpiryTimers::new();
        let handle = Handle::current();

        timers.schedule(&handle, store.clone(), "a", Duration::from_secs(1)).unwrap();
        timers.schedule(&handle, store.clone(), "b", Duration::from_secs(1)).unwrap();
        timers.cancel_all();
        assert_eq!(timers.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.len(), 2);
    }
}
