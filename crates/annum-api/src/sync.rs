//! Handlers for calendar sync.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/owners/:owner/sync/access` | Request calendar access; 403 if refused |
//! | `POST` | `/owners/:owner/sync` | Run one pass; returns [`SyncReport`] |
//! | `GET`  | `/owners/:owner/sync` | Stored status plus the current phase |
//! | `PUT`  | `/owners/:owner/sync/enabled` | Body: `{"enabled":false}` |
//!
//! All of them answer 503 when the server runs without a provider.

use std::sync::Arc;

use annum_core::{store::EventStore, sync_status::SyncStatus};
use annum_sync::{CalendarProvider, PermissionGate, Reconciler, SyncPhase, SyncReport};
use axum::{
  Json,
  Router,
  extract::{Path, State},
  routing::{post, put},
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, today_in};

pub struct SyncState<S, P, G> {
  pub reconciler: Arc<Reconciler<S, P, G>>,
  pub timezone:   Tz,
}

impl<S, P, G> Clone for SyncState<S, P, G> {
  fn clone(&self) -> Self {
    Self { reconciler: Arc::clone(&self.reconciler), timezone: self.timezone }
  }
}

pub(crate) fn router<S, P, G>(state: SyncState<S, P, G>) -> Router<()>
where
  S: EventStore + 'static,
  P: CalendarProvider + 'static,
  G: PermissionGate + 'static,
{
  Router::new()
    .route(
      "/owners/{owner}/sync",
      post(run::<S, P, G>).get(status::<S, P, G>),
    )
    .route("/owners/{owner}/sync/access", post(request_access::<S, P, G>))
    .route("/owners/{owner}/sync/enabled", put(set_enabled::<S, P, G>))
    .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct PhaseResponse {
  pub phase: SyncPhase,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
  #[serde(flatten)]
  pub status: SyncStatus,
  pub phase:  SyncPhase,
}

#[derive(Debug, Deserialize)]
pub struct EnabledBody {
  pub enabled: bool,
}

/// `POST /owners/:owner/sync/access`
pub async fn request_access<S, P, G>(
  State(state): State<SyncState<S, P, G>>,
  Path(owner): Path<String>,
) -> Result<Json<PhaseResponse>, ApiError>
where
  S: EventStore + 'static,
  P: CalendarProvider,
  G: PermissionGate,
{
  let phase = state.reconciler.request_access(&owner).await?;
  Ok(Json(PhaseResponse { phase }))
}

/// `POST /owners/:owner/sync`
pub async fn run<S, P, G>(
  State(state): State<SyncState<S, P, G>>,
  Path(owner): Path<String>,
) -> Result<Json<SyncReport>, ApiError>
where
  S: EventStore + 'static,
  P: CalendarProvider,
  G: PermissionGate,
{
  let report = state
    .reconciler
    .sync(&owner, today_in(state.timezone))
    .await?;
  Ok(Json(report))
}

/// `GET /owners/:owner/sync`
pub async fn status<S, P, G>(
  State(state): State<SyncState<S, P, G>>,
  Path(owner): Path<String>,
) -> Result<Json<StatusResponse>, ApiError>
where
  S: EventStore + 'static,
  P: CalendarProvider,
  G: PermissionGate,
{
  let status = state.reconciler.status(&owner).await?;
  let phase = state.reconciler.phase(&owner);
  Ok(Json(StatusResponse { status, phase }))
}

/// `PUT /owners/:owner/sync/enabled`
pub async fn set_enabled<S, P, G>(
  State(state): State<SyncState<S, P, G>>,
  Path(owner): Path<String>,
  Json(body): Json<EnabledBody>,
) -> Result<Json<SyncStatus>, ApiError>
where
  S: EventStore + 'static,
  P: CalendarProvider,
  G: PermissionGate,
{
  let status = state.reconciler.set_enabled(&owner, body.enabled).await?;
  Ok(Json(status))
}

/// Stands in for every sync endpoint when no provider is configured.
pub async fn unavailable() -> ApiError {
  ApiError::Unavailable("calendar sync is not configured".into())
}
