use std::collections::HashMap;
use std::sync::Arc;

use common::ItemId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Arena of per-item async locks.
///
/// Writers to the same item are serialised; writers to different items run
/// in parallel. Entries nobody holds are pruned on the next acquisition.
#[derive(Clone, Default)]
pub struct ItemLocks {
    locks: Arc<Mutex<HashMap<ItemId, Arc<Mutex<()>>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `item_id`. The lock is held until the
    /// guard is dropped.
    pub async fn lock(&self, item_id: ItemId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|id, lock| *id == item_id || Arc::strong_count(lock) > 1);
            locks.entry(item_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of items with a live lock entry.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
