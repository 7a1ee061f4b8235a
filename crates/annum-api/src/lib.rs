//! JSON REST API for Annum.
//!
//! Exposes an axum [`Router`] backed by any [`annum_core::store::EventStore`],
//! and optionally by a calendar sync [`Reconciler`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", annum_api::api_router(store.clone(), chrono_tz::UTC))
//! ```

pub mod dates;
pub mod error;
pub mod sync;
pub mod views;

use std::sync::Arc;

use annum_core::{store::EventStore, views::ViewAggregator};
use annum_sync::{CalendarProvider, PermissionGate, Reconciler};
use axum::{
  Router,
  routing::{get, post, put},
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

pub use error::ApiError;


/// Shared state of the record and view handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub views:    ViewAggregator<S>,
  /// Defines "today" when a request gives no `as_of`.
  pub timezone: Tz,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      views:    self.views.clone(),
      timezone: self.timezone,
    }
  }
}

impl<S: EventStore> AppState<S> {
  pub fn new(store: Arc<S>, timezone: Tz) -> Self {
    Self { views: ViewAggregator::new(Arc::clone(&store)), store, timezone }
  }
}

/// Today's date in `timezone`.
pub fn today_in(timezone: Tz) -> NaiveDate {
  Utc::now().with_timezone(&timezone).date_naive()
}

/// Build the API router for `store` with calendar sync unavailable; the sync
/// endpoints answer 503.
pub fn api_router<S>(store: Arc<S>, timezone: Tz) -> Router<()>
where
  S: EventStore + 'static,
{
  core_router(AppState::new(store, timezone)).merge(
    Router::new()
      .route(
        "/owners/{owner}/sync",
        get(sync::unavailable).post(sync::unavailable),
      )
      .route("/owners/{owner}/sync/access", post(sync::unavailable))
      .route("/owners/{owner}/sync/enabled", put(sync::unavailable)),
  )
}

/// Build the API router for `store` with calendar sync driven by
/// `reconciler`.
pub fn api_router_with_sync<S, P, G>(
  store: Arc<S>,
  reconciler: Arc<Reconciler<S, P, G>>,
  timezone: Tz,
) -> Router<()>
where
  S: EventStore + 'static,
  P: CalendarProvider + 'static,
  G: PermissionGate + 'static,
{
  core_router(AppState::new(store, timezone))
    .merge(sync::router(sync::SyncState { reconciler, timezone }))
}

fn core_router<S>(state: AppState<S>) -> Router<()>
where
  S: EventStore + 'static,
{
  Router::new()
    // Records
    .route(
      "/owners/{owner}/dates",
      get(dates::list::<S>).post(dates::create::<S>),
    )
    .route(
      "/dates/{id}",
      get(dates::get_one::<S>)
        .patch(dates::update::<S>)
        .delete(dates::delete::<S>),
    )
    // Views
    .route("/owners/{owner}/today", get(views::today::<S>))
    .route("/owners/{owner}/upcoming", get(views::upcoming::<S>))
    .route("/owners/{owner}/months/{year}/{month}", get(views::month::<S>))
    .route("/owners/{owner}/years/{year}", get(views::year::<S>))
    .route("/owners/{owner}/search", get(views::search::<S>))
    .with_state(state)
}
