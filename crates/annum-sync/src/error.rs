//! Error types for `annum-sync`.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::{machine::SyncPhase, provider::PermissionStatus};

/// A transient failure to fetch from the provider. Never retried internally;
/// the caller starts a new sync.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
  #[error("provider did not respond within {0:?}")]
  Timeout(Duration),

  #[error("provider request failed: {0}")]
  Http(String),

  #[error("provider returned malformed data: {0}")]
  Malformed(String),
}

/// Why one candidate could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
  pub external_id: String,
  pub reason:      String,
}

/// Some candidates failed to map or merge. The batch still completes; the
/// summary lands in `SyncStatus::last_error`.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{} of {attempted} candidates failed to merge", failures.len())]
pub struct PartialSyncError {
  pub attempted: usize,
  pub failures:  Vec<CandidateFailure>,
}

#[derive(Debug, Error)]
pub enum SyncError {
  /// Calendar access is denied or restricted; needs the user to change the
  /// permission out of band.
  #[error("calendar access is {0}")]
  Access(PermissionStatus),

  #[error("calendar sync is disabled for owner {0}")]
  Disabled(String),

  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error("cannot {event} while sync is {from}")]
  InvalidTransition { from: SyncPhase, event: &'static str },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SyncError {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
