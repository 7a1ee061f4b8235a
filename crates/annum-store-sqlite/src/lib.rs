//! SQLite backend for the Annum event store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Writes are additionally serialised per
//! owner by an in-process lock table.

mod encode;
mod locks;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
