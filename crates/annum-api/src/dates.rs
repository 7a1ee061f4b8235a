//! Handlers for special date records.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/owners/:owner/dates` | Body: [`CreateBody`]; returns 201 + stored record |
//! | `GET`    | `/owners/:owner/dates` | Optional `?category=` and `?origin=` |
//! | `GET`    | `/dates/:id` | Includes soft-deleted records; 404 if unknown |
//! | `PATCH`  | `/dates/:id` | Body: [`SpecialDatePatch`] |
//! | `DELETE` | `/dates/:id` | Soft delete; 204 |

use annum_core::{
  category::Category,
  date::OriginalDate,
  special_date::{NewSpecialDate, SourceOrigin, SpecialDate, SpecialDatePatch},
  store::{EventStore, ListFilter},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub subject_name:  String,
  pub category:      Category,
  /// Required when `category` is `custom`.
  pub custom_label:  Option<String>,
  pub original_date: OriginalDate,
  /// Defaults to the category icon.
  pub icon:          Option<String>,
}

/// `POST /owners/:owner/dates`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Path(owner): Path<String>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EventStore,
{
  let input = NewSpecialDate {
    custom_label: body.custom_label,
    icon: body.icon,
    ..NewSpecialDate::new(owner, body.subject_name, body.category, body.original_date)
  };
  let record = state.store.create(input).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub category: Option<Category>,
  pub origin:   Option<SourceOrigin>,
}

/// `GET /owners/:owner/dates[?category=<category>][&origin=<origin>]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Path(owner): Path<String>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<SpecialDate>>, ApiError>
where
  S: EventStore,
{
  let filter = ListFilter { category: params.category, origin: params.origin };
  let records = state
    .store
    .list(&owner, &filter)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(records))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /dates/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SpecialDate>, ApiError>
where
  S: EventStore,
{
  let record = state
    .store
    .get(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("special date {id} not found")))?;
  Ok(Json(record))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PATCH /dates/:id`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(patch): Json<SpecialDatePatch>,
) -> Result<Json<SpecialDate>, ApiError>
where
  S: EventStore,
{
  let record = state
    .store
    .update(id, &patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(record))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /dates/:id`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: EventStore,
{
  state.store.soft_delete(id).await.map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}
