use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

/// One async mutex per entity id. Holding the guard is the "transaction"
/// around a read-validate-write sequence on that entity.
pub(super) struct LockTable {
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl LockTable {
    pub(super) fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub(super) async fn acquire(&self, id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }
}
