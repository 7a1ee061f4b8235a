//! Error types for `annum-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input; rejected synchronously and never retried.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The id does not exist or refers to a soft-deleted record.
  #[error("special date not found: {0}")]
  NotFound(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Implemented by backend error types so outer layers can recover the core
/// classification (validation vs. not-found) without knowing the backend.
pub trait DomainError {
  /// The wrapped core error, if this error originated in the domain layer.
  fn domain(&self) -> Option<&Error>;
}

impl DomainError for Error {
  fn domain(&self) -> Option<&Error> { Some(self) }
}
