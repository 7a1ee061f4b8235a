//! Handlers for the calendar views.
//!
//! `as_of` defaults to today in the server's configured timezone.

use annum_core::{
  occurrence::OccurrenceView,
  special_date::SpecialDate,
  store::EventStore,
  views::{MonthGrid, TodayView, YearOverview},
};
use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{AppState, error::ApiError, today_in};

#[derive(Debug, Deserialize, Default)]
pub struct AsOfParams {
  pub as_of: Option<NaiveDate>,
}

/// `GET /owners/:owner/today[?as_of=YYYY-MM-DD]`
pub async fn today<S>(
  State(state): State<AppState<S>>,
  Path(owner): Path<String>,
  Query(params): Query<AsOfParams>,
) -> Result<Json<TodayView>, ApiError>
where
  S: EventStore,
{
  let as_of = params.as_of.unwrap_or_else(|| today_in(state.timezone));
  let view = state
    .views
    .today(&owner, as_of)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct UpcomingParams {
  pub within_days: u32,
  pub as_of:       Option<NaiveDate>,
}

/// `GET /owners/:owner/upcoming?within_days=<n>[&as_of=YYYY-MM-DD]`
pub async fn upcoming<S>(
  State(state): State<AppState<S>>,
  Path(owner): Path<String>,
  Query(params): Query<UpcomingParams>,
) -> Result<Json<Vec<OccurrenceView>>, ApiError>
where
  S: EventStore,
{
  let as_of = params.as_of.unwrap_or_else(|| today_in(state.timezone));
  let views = state
    .views
    .upcoming(&owner, as_of, params.within_days)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(views))
}

/// `GET /owners/:owner/months/:year/:month`
pub async fn month<S>(
  State(state): State<AppState<S>>,
  Path((owner, year, month)): Path<(String, i32, u32)>,
) -> Result<Json<MonthGrid>, ApiError>
where
  S: EventStore,
{
  let grid = state
    .views
    .month_grid(&owner, year, month)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(grid))
}

/// `GET /owners/:owner/years/:year`
pub async fn year<S>(
  State(state): State<AppState<S>>,
  Path((owner, year)): Path<(String, i32)>,
) -> Result<Json<YearOverview>, ApiError>
where
  S: EventStore,
{
  let overview = state
    .views
    .year_overview(&owner, year)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(overview))
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  #[serde(default)]
  pub q: String,
}

/// `GET /owners/:owner/search?q=<text>`
pub async fn search<S>(
  State(state): State<AppState<S>>,
  Path(owner): Path<String>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SpecialDate>>, ApiError>
where
  S: EventStore,
{
  let hits = state
    .views
    .search(&owner, &params.q)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(hits))
}
