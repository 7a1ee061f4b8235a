//! API error type and [`axum::response::IntoResponse`] implementation.

use annum_core::DomainError;
use annum_sync::SyncError;
use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad gateway: {0}")]
  BadGateway(String),

  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the core error it carries, if any.
  pub fn from_store<E>(e: E) -> Self
  where
    E: std::error::Error + DomainError + Send + Sync + 'static,
  {
    match e.domain() {
      Some(annum_core::Error::Validation(m)) => Self::BadRequest(m.clone()),
      Some(annum_core::Error::NotFound(id)) => {
        Self::NotFound(format!("special date {id} not found"))
      }
      None => Self::Store(Box::new(e)),
    }
  }
}

impl From<SyncError> for ApiError {
  fn from(e: SyncError) -> Self {
    match e {
      SyncError::Access(_) => Self::Forbidden(e.to_string()),
      SyncError::Disabled(_) | SyncError::InvalidTransition { .. } => {
        Self::Conflict(e.to_string())
      }
      SyncError::Provider(_) => Self::BadGateway(e.to_string()),
      SyncError::Store(inner) => Self::Store(inner),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Store(e) => {
        error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
