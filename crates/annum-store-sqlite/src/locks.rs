//! Per-owner write serialisation.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per owner, created on first use. Holding the guard makes
/// the holder the only writer for that owner; other owners are unaffected.
#[derive(Clone, Default)]
pub struct OwnerLocks {
  inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl OwnerLocks {
  pub async fn acquire(&self, owner_id: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(table.entry(owner_id.to_owned()).or_default())
    };
    lock.lock_owned().await
  }
}
