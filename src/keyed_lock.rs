use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Smallest map size at which idle entries are pruned.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct Slots {
    map: HashMap<String, Arc<AsyncMutex<()>>>,
    /// Next size that triggers a prune. Twice the live size after each
    /// prune, so pruning stays amortized when many keys are held at once.
    prune_at: usize,
}

impl Default for Slots {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            prune_at: PRUNE_THRESHOLD,
        }
    }
}

impl Slots {
    fn slot(&mut self, key: &str) -> Arc<AsyncMutex<()>> {
        if self.map.len() >= self.prune_at {
            self.map.retain(|_, slot| Arc::strong_count(slot) > 1);
            self.prune_at = (self.map.len() * 2).max(PRUNE_THRESHOLD);
        }
        self.map.entry(key.to_string()).or_default().clone()
    }
}

/// One async mutex per key. Holders of different keys never contend.
#[derive(Debug, Clone, Default)]
pub struct KeyedLock {
    inner: Arc<Mutex<Slots>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds `key`. The guard releases on drop.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .slot(key);
        slot.lock_owned().await
    }

    pub fn tracked_keys(&self) -> usize {
        self.inner
            .lock()
            .map(|slots| slots.map.len())
            .unwrap_or_default()
    }
}
