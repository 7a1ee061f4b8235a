//! The `EventStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `annum-store-sqlite`).
//! Higher layers (`annum-sync`, `annum-api`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  DomainError,
  category::Category,
  special_date::{NewSpecialDate, SourceOrigin, SpecialDate, SpecialDatePatch},
  sync_status::{SyncClaim, SyncCompletion, SyncStatus},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`EventStore::list`]. Soft-deleted records are never
/// listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
  pub category: Option<Category>,
  pub origin:   Option<SourceOrigin>,
}

impl ListFilter {
  pub fn matches(&self, record: &SpecialDate) -> bool {
    self.category.is_none_or(|c| c == record.category)
      && self.origin.is_none_or(|o| o == record.source_origin)
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the canonical, durable store of special dates and
/// per-owner sync status.
///
/// Writes are serialised per owner: two writes for the same owner never
/// interleave. Reads take no lock.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EventStore: Send + Sync {
  type Error: std::error::Error
    + DomainError
    + From<crate::Error>
    + Send
    + Sync
    + 'static;

  // ── Special dates ─────────────────────────────────────────────────────

  /// Validate and persist a new record. Fails with
  /// [`crate::Error::Validation`] on malformed input.
  fn create(
    &self,
    input: NewSpecialDate,
  ) -> impl Future<Output = Result<SpecialDate, Self::Error>> + Send + '_;

  /// Apply `patch` to an active record. Fails with
  /// [`crate::Error::NotFound`] if `id` is missing or inactive.
  fn update<'a>(
    &'a self,
    id: Uuid,
    patch: &'a SpecialDatePatch,
  ) -> impl Future<Output = Result<SpecialDate, Self::Error>> + Send + 'a;

  /// Mark a record inactive and refresh `updated_at`. The record stays
  /// readable through [`EventStore::get`].
  fn soft_delete(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve a record by id, active or not.
  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SpecialDate>, Self::Error>> + Send + '_;

  /// Active records of `owner_id` matching `filter`, in no particular order.
  fn list<'a>(
    &'a self,
    owner_id: &'a str,
    filter: &'a ListFilter,
  ) -> impl Future<Output = Result<Vec<SpecialDate>, Self::Error>> + Send + 'a;

  /// The record imported under `external_id`, preferring an active one. An
  /// inactive record is returned when the user deleted the import.
  fn find_by_external_id<'a>(
    &'a self,
    owner_id: &'a str,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<SpecialDate>, Self::Error>> + Send + 'a;

  // ── Sync status ───────────────────────────────────────────────────────

  fn sync_status<'a>(
    &'a self,
    owner_id: &'a str,
  ) -> impl Future<Output = Result<Option<SyncStatus>, Self::Error>> + Send + 'a;

  /// Atomically claim the owner's in-progress flag, creating the status on
  /// the first attempt. Writes nothing when a pass is already running.
  fn begin_sync<'a>(
    &'a self,
    owner_id: &'a str,
  ) -> impl Future<Output = Result<SyncClaim, Self::Error>> + Send + 'a;

  /// Record the outcome of a pass and clear the in-progress flag.
  fn finish_sync<'a>(
    &'a self,
    owner_id: &'a str,
    completion: SyncCompletion,
  ) -> impl Future<Output = Result<SyncStatus, Self::Error>> + Send + 'a;

  /// Enable or disable the integration for an owner.
  fn set_sync_enabled<'a>(
    &'a self,
    owner_id: &'a str,
    enabled: bool,
  ) -> impl Future<Output = Result<SyncStatus, Self::Error>> + Send + 'a;
}
