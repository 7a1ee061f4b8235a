//! Calendar synchronisation for Annum.
//!
//! Imports candidate occasions from an external calendar provider and merges
//! them into an [`annum_core::store::EventStore`] without creating duplicates
//! across repeated imports. The provider and the permission subsystem are
//! injected through the traits in [`provider`].

pub mod classify;
pub mod error;
pub mod http;
pub mod machine;
pub mod provider;
pub mod reconciler;

pub use error::{CandidateFailure, PartialSyncError, ProviderError, SyncError};
pub use http::HttpCalendarProvider;
pub use machine::SyncPhase;
pub use provider::{
  CalendarEvent, CalendarProvider, ConfiguredPermission, DateRange, PermissionGate,
  PermissionStatus,
};
pub use reconciler::{Reconciler, SyncConfig, SyncReport};

#[cfg(test)]
mod tests;
