//! Per-owner calendar synchronisation status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable sync bookkeeping for one owner. Created on the first sync attempt
/// and updated after every reconciliation pass; never deleted while the
/// integration stays enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
  pub owner_id:     String,
  pub last_sync_at: Option<DateTime<Utc>>,
  pub enabled:      bool,
  /// Records merged by the most recent pass that reached the merge phase.
  pub total_synced: u64,
  /// Summary of the most recent failure; `None` after a clean pass.
  pub last_error:   Option<String>,
  /// At most one pass per owner runs at a time.
  pub in_progress:  bool,
}

impl SyncStatus {
  /// The status of an owner that has never synced.
  pub fn new(owner_id: impl Into<String>) -> Self {
    Self {
      owner_id:     owner_id.into(),
      last_sync_at: None,
      enabled:      true,
      total_synced: 0,
      last_error:   None,
      in_progress:  false,
    }
  }
}

/// Result of [`crate::store::EventStore::begin_sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncClaim {
  /// The in-progress flag was clear and is now set; the caller owns the pass.
  Claimed(SyncStatus),
  /// Another pass holds the flag. Nothing was written.
  AlreadyRunning(SyncStatus),
}

/// The outcome recorded by [`crate::store::EventStore::finish_sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCompletion {
  pub finished_at:  DateTime<Utc>,
  /// `None` keeps the previous total (the pass never reached the merge).
  pub total_synced: Option<u64>,
  pub last_error:   Option<String>,
}
